//! Speech transcoding adapter contract
//!
//! Both directions are slow, network-bound calls with no streaming and
//! no partial results: one complete audio payload in, one complete
//! transcript or synthesis out.

mod google;

pub use google::{GoogleSpeech, SpeechConfig};

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait SpeechTranscoder: Send + Sync {
    /// Transcribe a complete audio payload. An empty or low-confidence
    /// result is a failure, never `Ok("")`.
    async fn speech_to_text(&self, audio: &[u8]) -> Result<String>;

    /// Synthesize text with the system's one fixed voice and encoding.
    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>>;
}
