//! Error types for the intake agent.

use std::time::Duration;

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Profile store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Profile store at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Errors surfaced by a single intake turn or session.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Invalid next-turn output: {reason}. Raw snippet: {raw}")]
    InvalidResponse { reason: String, raw: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Profile serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
