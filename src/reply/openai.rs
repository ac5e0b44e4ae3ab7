use serde::Deserialize;

use super::{ReplyGenerator, Utterance};
use crate::error::{MeetError, Result};
use crate::meet::Speaker;
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const INTERVIEWER_PROMPT: &str = "You are a professional interviewer conducting a timed, \
spoken job interview. Keep every reply short and conversational, since it will be read \
aloud. Ask one question at a time and build on the candidate's previous answers. If the \
conversation is empty, greet the candidate briefly and ask your first question.";

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    256
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: None,
        }
    }
}

/// OpenAI chat-completions adapter: POST {base_url}/v1/chat/completions.
/// Stateless; shared across all meets.
pub struct OpenAiReplyGenerator {
    config: ReplyConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiReplyGenerator {
    pub fn new(config: ReplyConfig) -> Result<Self> {
        // The key is resolved once here; the environment is never read
        // again after construction.
        let api_key = resolve_api_key(&config, std::env::var("OPENAI_API_KEY").ok())?;

        Ok(Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        })
    }

    fn request_body(&self, history: &[Utterance]) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": INTERVIEWER_PROMPT,
        })];

        for utterance in history {
            let role = match utterance.speaker {
                Speaker::User => "user",
                Speaker::System => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": utterance.text }));
        }

        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
        })
    }
}

/// Pick the configured key over the environment one; either must be
/// non-empty. The caller reads the environment so this stays pure.
fn resolve_api_key(config: &ReplyConfig, env_key: Option<String>) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or(env_key.filter(|k| !k.is_empty()))
        .ok_or_else(|| {
            MeetError::Config(
                "reply generator requires an API key (set reply.api_key or OPENAI_API_KEY)".into(),
            )
        })
}

/// Pull the reply text out of a chat-completions response; a blank
/// reply is a failure, never an empty utterance.
fn reply_from(json: &serde_json::Value) -> Result<String> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(MeetError::Generation(
            "reply service returned no content".into(),
        ));
    }
    Ok(content.to_string())
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyGenerator {
    async fn next_utterance(&self, history: &[Utterance]) -> Result<String> {
        let base_url = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(history))
            .send()
            .await
            .map_err(|e| MeetError::Generation(format!("reply service request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MeetError::Generation(format!(
                "reply service error {status}: {text}"
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MeetError::Generation(format!("reply service response parse error: {e}")))?;

        reply_from(&json)
    }
}
