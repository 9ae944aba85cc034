//! Completion model configuration from TOML (`[llm]` section)

use crate::llm::OpenAiSettings;
use crate::llm::openai::DEFAULT_BASE_URL;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw completion gateway configuration from TOML
///
/// The API key itself never lives in the file: `api_key_env` names the
/// environment variable to read it from.
///
/// # Example
///
/// ```toml
/// [llm]
/// base_url = "http://localhost:11434/v1"
/// model = "llama3.1"
/// api_key_env = "OPENAI_API_KEY"
/// timeout_secs = 60
/// max_attempts = 3
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for FileLlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            max_attempts: 3,
        }
    }
}

impl FileLlmConfig {
    /// Resolve the settings, reading the API key from the environment.
    pub fn to_openai_settings(&self) -> OpenAiSettings {
        let api_key = if self.api_key_env.is_empty() {
            None
        } else {
            std::env::var(&self.api_key_env)
                .ok()
                .filter(|key| !key.trim().is_empty())
        };
        OpenAiSettings {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            model: self.model.clone(),
            api_key,
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                ..Default::default()
            },
        }
    }
}
