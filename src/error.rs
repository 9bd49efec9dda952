//! Error types for mailsweep.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors. Always fatal for the run that hit them.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Rule '{rule}' is invalid: {message}")]
    InvalidRule { rule: String, message: String },

    #[error("Rule '{rule}' has an unusable query: {source}")]
    InvalidQuery {
        rule: String,
        #[source]
        source: QueryError,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} returned HTTP {status}")]
    BadStatus { provider: String, status: u16 },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("All providers failed (primary: {primary}; fallback: {fallback})")]
    AllProvidersFailed { primary: String, fallback: String },
}

impl LlmError {
    /// Map a transport error into the matching variant.
    pub(crate) fn from_reqwest(provider: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
                timeout,
            }
        } else if let Some(status) = err.status() {
            Self::BadStatus {
                provider: provider.to_string(),
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::InvalidResponse {
                provider: provider.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::RequestFailed {
                provider: provider.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Classification problems. Both variants degrade to a `review` decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classification unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Ambiguous classification: {reason}")]
    Ambiguous { reason: String },
}

impl ClassifyError {
    /// Short label for logging and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "classification_unavailable",
            Self::Ambiguous { .. } => "ambiguous_classification",
        }
    }
}

/// Gmail query subset parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("empty query")]
    Empty,

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("invalid value '{value}' for operator '{operator}'")]
    InvalidValue { operator: String, value: String },

    #[error("unbalanced '{0}'")]
    Unbalanced(char),

    #[error("unexpected end of query")]
    UnexpectedEnd,
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Rules evaluation failed: {0}")]
    Rules(#[from] ConfigError),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
