//! Configuration types.
//!
//! Everything process-wide is read once from the environment into typed
//! structs and handed to constructors explicitly.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REVIEW_LABEL: &str = "NeedsReview";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Remote fallback endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

/// Classifier client configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the local Ollama server.
    pub endpoint: String,
    /// Model name served by Ollama.
    pub model: String,
    /// Optional remote fallback, only set when an API key is present.
    pub fallback: Option<FallbackConfig>,
    /// Per-request timeout. Local inference can be slow.
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            fallback: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClassifierConfig {
    /// Read `OLLAMA_*`, `OPENAI_*` and `CLASSIFIER_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let endpoint = get("OLLAMA_ENDPOINT").unwrap_or_else(|| DEFAULT_OLLAMA_ENDPOINT.into());
        validate_url("OLLAMA_ENDPOINT", &endpoint)?;

        let model = get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.into());

        let timeout_secs = match get("CLASSIFIER_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "CLASSIFIER_TIMEOUT_SECS".into(),
                        message: format!("expected a positive number of seconds, got '{raw}'"),
                    });
                }
                Ok(secs) => secs,
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        let fallback = match get("OPENAI_API_KEY") {
            Some(key) => {
                let base_url =
                    get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into());
                validate_url("OPENAI_BASE_URL", &base_url)?;
                Some(FallbackConfig {
                    base_url,
                    api_key: SecretString::from(key),
                    model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into()),
                })
            }
            None => None,
        };

        Ok(Self {
            endpoint,
            model,
            fallback,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Sweep-level settings shared by the CLI and the HTTP server.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Label applied when the classifier answers `review`.
    pub review_label: String,
    /// Address for `serve`.
    pub bind: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            review_label: DEFAULT_REVIEW_LABEL.to_string(),
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl SweepConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            review_label: lookup("MAILSWEEP_REVIEW_LABEL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.review_label),
            bind: lookup("MAILSWEEP_BIND")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.bind),
        }
    }
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{value}' is not a valid URL: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}
