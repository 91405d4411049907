//! Configuration types.
//!
//! Everything is read once at process start and passed into constructors as
//! plain values. Each `from_env` has a `from_lookup` twin that takes the
//! variable source as a closure, which is what the tests drive.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default location of the JSON-file profile store.
pub const DEFAULT_PROFILES_PATH: &str = "data/intake_profiles.json";

/// Client id used by the demo driver when `CLIENT_ID` is unset.
pub const DEFAULT_CLIENT_ID: &str = "demo-user";

/// How far the interview goes before the model may finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Finish as soon as the model judges the core fields sufficient.
    Core,
    /// Keep asking until every deep path has been answered or asked.
    #[default]
    Deep,
}

impl fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Deep => write!(f, "deep"),
        }
    }
}

impl FromStr for CompletionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" => Ok(Self::Core),
            "deep" => Ok(Self::Deep),
            other => Err(format!("expected \"core\" or \"deep\", got \"{other}\"")),
        }
    }
}

/// Intake agent configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub completion_mode: CompletionMode,
    /// Output token cap for each model call.
    pub max_output_tokens: u32,
    /// Re-ask once when the model tries to FINISH with deep paths remaining.
    pub finish_guard: bool,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            completion_mode: CompletionMode::Deep,
            max_output_tokens: 700,
            finish_guard: true,
        }
    }
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            completion_mode: parse_var(&lookup, "INTAKE_COMPLETION_MODE")?
                .unwrap_or(defaults.completion_mode),
            max_output_tokens: parse_var(&lookup, "INTAKE_MAX_OUTPUT_TOKENS")?
                .unwrap_or(defaults.max_output_tokens),
            finish_guard: defaults.finish_guard,
        })
    }
}

/// Demo session configuration: who is being interviewed and where profiles live.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub client_id: String,
    pub profiles_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            profiles_path: PathBuf::from(DEFAULT_PROFILES_PATH),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            client_id: non_empty(&lookup, "CLIENT_ID").unwrap_or(defaults.client_id),
            profiles_path: non_empty(&lookup, "INTAKE_PROFILES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.profiles_path),
        }
    }
}

/// Read a variable, treating blank values as unset.
pub(crate) fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an optional variable.
pub(crate) fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}
