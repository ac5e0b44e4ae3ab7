//! Reply generation adapter contract
//!
//! The generator is stateless between calls: all context arrives in the
//! ordered history, which the turn engine rebuilds from the turn store
//! on every call.

mod openai;

pub use openai::{OpenAiReplyGenerator, ReplyConfig};

use async_trait::async_trait;

use crate::error::Result;
use crate::meet::Speaker;

/// One (speaker, text) pair of conversation context, oldest first.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Produce the next system utterance given the conversation so far.
    /// An empty history asks for the interview opener.
    async fn next_utterance(&self, history: &[Utterance]) -> Result<String>;
}
