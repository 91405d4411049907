//! LLM integration.
//!
//! The agent only ever talks to `dyn LlmProvider`; the OpenAI Responses API
//! client is the single production implementation.

pub mod openai;
pub mod provider;
#[cfg(test)]
pub(crate) mod scripted;

pub use openai::OpenAiResponsesProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::{non_empty, parse_var};
use crate::error::{ConfigError, LlmError};

/// Model used when `COLLEGEAIBOT_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gpt-5.2";

/// Request timeout used when `COLLEGEAIBOT_TIMEOUT_S` is unset.
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Read the provider configuration. A missing `OPENAI_API_KEY` is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = non_empty(&lookup, "OPENAI_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let timeout_secs: f64 =
            parse_var(&lookup, "COLLEGEAIBOT_TIMEOUT_S")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let timeout =
            Duration::try_from_secs_f64(timeout_secs).map_err(|e| ConfigError::InvalidValue {
                key: "COLLEGEAIBOT_TIMEOUT_S".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            model: non_empty(&lookup, "COLLEGEAIBOT_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: non_empty(&lookup, "OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiResponsesProvider::new(config.clone())?;
    tracing::info!("Using OpenAI Responses API (model: {})", config.model);
    Ok(Arc::new(provider))
}
