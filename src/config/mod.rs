//! Application configuration

pub mod profile;

use std::env;
use std::path::Path;

pub use profile::{ProfileConfig, ProfileError};

/// Default hosted API endpoint.
const DEFAULT_API_URL: &str = "https://api4prod.elevatics.site";

/// Runtime configuration, resolved from the environment with an optional
/// TOML profile layered underneath (environment wins).
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub table: String,
    pub user_id: String,
    pub request_timeout_secs: u64,
    pub stream_idle_secs: u64,
    pub speech_chunk_size: usize,
    pub speech_language: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let profile = match env::var("DIGIYATRA_PROFILE") {
            Ok(path) => ProfileConfig::from_file(Path::new(&path))?,
            Err(_) => {
                let default = Path::new("digiyatra.toml");
                if default.exists() {
                    ProfileConfig::from_file(default)?
                } else {
                    ProfileConfig::default()
                }
            }
        };

        let api_key = env::var(&profile.api.key_env).ok();

        Ok(Self {
            api_url: env::var("DIGIYATRA_API_URL").unwrap_or(profile.api.url),
            api_key,
            model: env::var("DIGIYATRA_MODEL").unwrap_or(profile.chat.model),
            table: env::var("DIGIYATRA_TABLE").unwrap_or(profile.chat.table),
            user_id: env::var("DIGIYATRA_USER_ID").unwrap_or(profile.chat.user_id),
            request_timeout_secs: env_parsed("DIGIYATRA_TIMEOUT_SECS")
                .unwrap_or(profile.api.request_timeout_secs),
            stream_idle_secs: env_parsed("DIGIYATRA_IDLE_SECS")
                .unwrap_or(profile.api.stream_idle_secs),
            speech_chunk_size: env_parsed("DIGIYATRA_SPEECH_CHUNK")
                .unwrap_or(profile.speech.chunk_size),
            speech_language: env::var("DIGIYATRA_SPEECH_LANGUAGE")
                .unwrap_or(profile.speech.language),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let profile = ProfileConfig::default();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: profile.chat.model,
            table: profile.chat.table,
            user_id: profile.chat.user_id,
            request_timeout_secs: profile.api.request_timeout_secs,
            stream_idle_secs: profile.api.stream_idle_secs,
            speech_chunk_size: profile.speech.chunk_size,
            speech_language: profile.speech.language,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}
