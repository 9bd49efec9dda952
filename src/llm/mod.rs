//! LLM integration.
//!
//! Supports:
//! - **Ollama**: local `/api/generate`, always the primary
//! - **OpenAI**: remote `/chat/completions`, optional fallback
//!
//! Both are plain `reqwest` clients behind the `LlmProvider` trait, wrapped in
//! a `FailoverProvider` so callers see a single provider.

pub mod failover;
pub mod ollama;
pub mod openai;
pub mod provider;

pub use failover::FailoverProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::ClassifierConfig;
use crate::error::LlmError;

/// Create the classifier's provider chain from configuration.
pub fn create_provider(config: &ClassifierConfig) -> Result<Arc<FailoverProvider>, LlmError> {
    let primary: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(
        &config.endpoint,
        &config.model,
        config.timeout,
    )?);
    tracing::info!(endpoint = %config.endpoint, model = %config.model, "Using Ollama");

    let fallback: Option<Arc<dyn LlmProvider>> = match &config.fallback {
        Some(fb) => {
            tracing::info!(model = %fb.model, "OpenAI fallback configured");
            Some(Arc::new(OpenAiProvider::new(
                &fb.base_url,
                fb.api_key.clone(),
                &fb.model,
                config.timeout,
            )?))
        }
        None => None,
    };

    Ok(Arc::new(FailoverProvider::new(primary, fallback)))
}
