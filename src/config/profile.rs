//! Per-deployment profile loaded from a TOML file
//!
//! A profile pins the API endpoint, chat defaults (model, knowledge table),
//! and speech settings for one deployment of the console. Unknown keys are
//! rejected so a typo fails loudly instead of silently falling back to a
//! default.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::DEFAULT_API_URL;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    #[serde(default)]
    pub api: ApiProfile,

    #[serde(default)]
    pub chat: ChatProfile,

    #[serde(default)]
    pub speech: SpeechProfile,
}

impl ProfileConfig {
    /// Load a profile from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a profile from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ProfileError> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiProfile {
    /// Base URL of the hosted assistant API.
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_key_env")]
    pub key_env: String,

    /// Overall request timeout for non-streaming calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long a silent open stream is allowed to sit before the read is
    /// abandoned as a terminal error.
    #[serde(default = "default_stream_idle")]
    pub stream_idle_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatProfile {
    #[serde(default = "default_model")]
    pub model: String,

    /// Knowledge table the assistant answers from.
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_user_id")]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeechProfile {
    /// Target utterance length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// BCP-47 tag for the synthesizer voice.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_key_env() -> String {
    "DIGIYATRA_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_stream_idle() -> u64 {
    90
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_table() -> String {
    "digiyatra".to_string()
}

fn default_user_id() -> String {
    "console".to_string()
}

fn default_chunk_size() -> usize {
    200
}

fn default_language() -> String {
    "en-IN".to_string()
}

impl Default for ApiProfile {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            key_env: default_key_env(),
            request_timeout_secs: default_request_timeout(),
            stream_idle_secs: default_stream_idle(),
        }
    }
}

impl Default for ChatProfile {
    fn default() -> Self {
        Self {
            model: default_model(),
            table: default_table(),
            user_id: default_user_id(),
        }
    }
}

impl Default for SpeechProfile {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            language: default_language(),
        }
    }
}

/// Profile loading errors
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PROFILE: &str = r#"
[api]
url = "https://staging.example.net"
stream_idle_secs = 30

[chat]
model = "meta-llama/llama-3.1-8b-instruct"
table = "dgca"

[speech]
chunk_size = 160
language = "hi-IN"
"#;

    #[test]
    fn parse_full_profile() {
        let profile = ProfileConfig::from_toml(SAMPLE_PROFILE).unwrap();
        assert_eq!(profile.api.url, "https://staging.example.net");
        assert_eq!(profile.api.stream_idle_secs, 30);
        assert_eq!(profile.api.request_timeout_secs, 120); // default
        assert_eq!(profile.chat.table, "dgca");
        assert_eq!(profile.speech.chunk_size, 160);
        assert_eq!(profile.speech.language, "hi-IN");
    }

    #[test]
    fn empty_profile_is_all_defaults() {
        let profile = ProfileConfig::from_toml("").unwrap();
        assert_eq!(profile.api.url, DEFAULT_API_URL);
        assert_eq!(profile.chat.model, "openai/gpt-4o-mini");
        assert_eq!(profile.chat.table, "digiyatra");
        assert_eq!(profile.speech.chunk_size, 200);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let bad = "[api]\nurll = \"typo\"\n";
        assert!(ProfileConfig::from_toml(bad).is_err());
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.toml");
        std::fs::write(&path, SAMPLE_PROFILE).unwrap();

        let profile = ProfileConfig::from_file(&path).unwrap();
        assert_eq!(profile.chat.table, "dgca");
    }
}
