//! LLM client settings loaded from the environment and an optional `.env` file

use crate::error::PipelineError;
use std::env;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mistralai/mistral-small-3.2-24b-instruct:free";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for the chat-completion endpoint.
#[derive(Clone, PartialEq)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Load from the environment, reading `.env` first if present.
    ///
    /// `OPENROUTER_API_KEY` is required; its absence is fatal for any caller
    /// that needs the LLM.
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok();

        let api_key = env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(PipelineError::MissingApiKey)?;

        let api_url = env::var("OPENROUTER_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let model = env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let timeout_secs = match env::var("LLM_TIMEOUT_SECS") {
            Ok(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| PipelineError::InvalidConfig {
                    key: "LLM_TIMEOUT_SECS",
                    value,
                })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url,
            model,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// Keeps the bearer token out of logs.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}
