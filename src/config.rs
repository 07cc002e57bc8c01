//! Configuration management for the tool agent.
//!
//! Configuration is read from environment variables:
//! - `OPENROUTER_API_KEY` - Required. API key for the model service.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible endpoint. Defaults to `https://openrouter.ai/api/v1`.
//! - `DEFAULT_MODEL` - Optional. Model identifier. Defaults to `openai/gpt-4o-mini`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `MAX_ITERATIONS` - Optional. Model calls allowed per turn. Defaults to `8`.
//! - `MODEL_TIMEOUT_SECS` - Optional. Timeout per model call, `0` disables. Defaults to `60`.
//! - `TOOL_TIMEOUT_SECS` - Optional. Timeout per tool call, `0` disables. Defaults to `30`.
//! - `NATIVE_LANGUAGE` - Optional. Working language of the agent. Defaults to `English`.
//! - `DUPLICATE_TOOLS` - Optional. `reject` or `replace`. Defaults to `reject`.
//! - `SESSION_DB_PATH` - Optional. SQLite file for persistent sessions.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::tools::DuplicatePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the model service
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API
    pub llm_base_url: String,

    /// Model identifier
    pub default_model: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum model calls per turn
    pub max_iterations: usize,

    /// Timeout per model call (`None` = unbounded)
    pub model_timeout: Option<Duration>,

    /// Timeout per tool call (`None` = unbounded)
    pub tool_timeout: Option<Duration>,

    /// Language the agent reasons in and stores history in
    pub native_language: String,

    /// What to do when two tools share a name
    pub duplicate_tools: DuplicatePolicy,

    /// SQLite file for persistent sessions; in-memory when unset
    pub session_db_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set,
    /// and `ConfigError::InvalidValue` for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let defaults = Self::new(api_key, "openai/gpt-4o-mini".to_string());

        Ok(Self {
            llm_base_url: lookup("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            default_model: lookup("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            max_iterations: parse_max_iterations(&lookup, defaults.max_iterations)?,
            model_timeout: parse_timeout(&lookup, "MODEL_TIMEOUT_SECS", 60)?,
            tool_timeout: parse_timeout(&lookup, "TOOL_TIMEOUT_SECS", 30)?,
            native_language: lookup("NATIVE_LANGUAGE").unwrap_or(defaults.native_language),
            duplicate_tools: parse_var(&lookup, "DUPLICATE_TOOLS", defaults.duplicate_tools)?,
            session_db_path: lookup("SESSION_DB_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            api_key: defaults.api_key,
        })
    }

    /// Create a config with default values (useful for testing).
    pub fn new(api_key: String, default_model: String) -> Self {
        Self {
            api_key,
            llm_base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model,
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_iterations: 8,
            model_timeout: Some(Duration::from_secs(60)),
            tool_timeout: Some(Duration::from_secs(30)),
            native_language: "English".to_string(),
            duplicate_tools: DuplicatePolicy::Reject,
            session_db_path: None,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_max_iterations<F>(lookup: &F, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_var(lookup, "MAX_ITERATIONS", default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            "MAX_ITERATIONS".to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(value)
}

fn parse_timeout<F>(lookup: &F, key: &str, default_secs: u64) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_var(lookup, key, default_secs)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
