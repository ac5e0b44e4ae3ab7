use anyhow::Result;
use serde::Deserialize;

use crate::reply::ReplyConfig;
use crate::speech::SpeechConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub meet: MeetConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/voxmeet.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MeetConfig {
    /// Length of the meet window once started
    pub window_secs: u64,
    /// Length of generated meet codes
    pub code_length: usize,
}

impl Default for MeetConfig {
    fn default() -> Self {
        Self {
            window_secs: 600, // 10 minutes
            code_length: 9,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuotaConfig {
    /// Generated system turns allowed per meet per window
    pub max_turns: usize,
    pub window_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_turns: 60,
            window_secs: 3600, // 60 minutes
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VOXMEET").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
