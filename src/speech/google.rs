use base64::Engine;
use serde::Deserialize;

use super::SpeechTranscoder;
use crate::error::{MeetError, Result};
use async_trait::async_trait;

const DEFAULT_RECOGNIZE_URL: &str = "https://speech.googleapis.com/v1/speech:recognize";
const DEFAULT_SYNTHESIZE_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Voice and recognition settings for the Google speech services. One
/// fixed configuration for the whole system.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hertz: u32,
    /// Override endpoints (tests point these at a local server).
    #[serde(default)]
    pub recognize_url: Option<String>,
    #[serde(default)]
    pub synthesize_url: Option<String>,
}

fn default_language_code() -> String {
    "en-IN".to_string()
}

fn default_voice_name() -> String {
    "en-IN-Neural2-B".to_string()
}

fn default_sample_rate() -> u32 {
    48_000
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            language_code: default_language_code(),
            voice_name: default_voice_name(),
            sample_rate_hertz: default_sample_rate(),
            recognize_url: None,
            synthesize_url: None,
        }
    }
}

/// Google Cloud Speech-to-Text / Text-to-Speech REST adapter.
/// Stateless; a single instance is shared across all meets.
pub struct GoogleSpeech {
    config: SpeechConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GoogleSpeech {
    pub fn new(config: SpeechConfig) -> Result<Self> {
        // The key is resolved once here; the environment is never read
        // again after construction.
        let api_key = resolve_api_key(&config, std::env::var("GOOGLE_API_KEY").ok())?;

        Ok(Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        })
    }

    fn recognize_body(&self, audio: &[u8]) -> serde_json::Value {
        serde_json::json!({
            "config": {
                "enableAutomaticPunctuation": false,
                "encoding": "WEBM_OPUS",
                "languageCode": self.config.language_code,
                "model": "default",
                "sampleRateHertz": self.config.sample_rate_hertz,
            },
            "audio": {
                "content": base64::engine::general_purpose::STANDARD.encode(audio),
            },
        })
    }

    fn synthesize_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "input": { "text": text },
            "voice": {
                "languageCode": self.config.language_code,
                "ssmlGender": "MALE",
                "name": self.config.voice_name,
            },
            "audioConfig": { "audioEncoding": "MP3" },
        })
    }

    async fn post(&self, url: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}?key={}", url, self.api_key);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MeetError::Transcription(format!("speech service request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MeetError::Transcription(format!(
                "speech service error {status}: {text}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| MeetError::Transcription(format!("speech service response parse error: {e}")))
    }
}

/// Pick the configured key over the environment one; either must be
/// non-empty. The caller reads the environment so this stays pure.
fn resolve_api_key(config: &SpeechConfig, env_key: Option<String>) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or(env_key.filter(|k| !k.is_empty()))
        .ok_or_else(|| {
            MeetError::Config(
                "Google speech adapter requires an API key (set speech.api_key or GOOGLE_API_KEY)"
                    .into(),
            )
        })
}

/// Pull the best transcript out of a recognize response. Empty and
/// missing transcripts are both failures.
fn transcript_from(json: &serde_json::Value) -> Result<String> {
    let transcript = json["results"][0]["alternatives"][0]["transcript"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();

    if transcript.is_empty() {
        return Err(MeetError::Transcription(
            "speech service returned no transcript".into(),
        ));
    }
    Ok(transcript.to_string())
}

/// Decode the synthesized audio out of a synthesize response.
fn audio_from(json: &serde_json::Value) -> Result<Vec<u8>> {
    let content = json["audioContent"].as_str().unwrap_or_default();
    if content.is_empty() {
        return Err(MeetError::Generation(
            "speech service returned no audio content".into(),
        ));
    }

    base64::engine::general_purpose::STANDARD
        .decode(content)
        .map_err(|e| MeetError::Generation(format!("invalid audio content encoding: {e}")))
}

#[async_trait]
impl SpeechTranscoder for GoogleSpeech {
    async fn speech_to_text(&self, audio: &[u8]) -> Result<String> {
        let url = self
            .config
            .recognize_url
            .as_deref()
            .unwrap_or(DEFAULT_RECOGNIZE_URL)
            .to_string();

        let json = self.post(&url, self.recognize_body(audio)).await?;
        transcript_from(&json)
    }

    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>> {
        let url = self
            .config
            .synthesize_url
            .as_deref()
            .unwrap_or(DEFAULT_SYNTHESIZE_URL)
            .to_string();

        let json = self
            .post(&url, self.synthesize_body(text))
            .await
            .map_err(|e| match e {
                // Synthesis failures surface as generation failures: the
                // system utterance could not be produced.
                MeetError::Transcription(msg) => MeetError::Generation(msg),
                other => other,
            })?;
        audio_from(&json)
    }
}
