//! Local model provider speaking Ollama's `/api/generate`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

const PROVIDER: &str = "ollama";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama provider. One blocking-style request per call, no retries.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    fn url(&self) -> String {
        format!("{}/api/generate", self.endpoint)
    }

    fn request_body(&self, request: &CompletionRequest) -> GenerateRequest<'_> {
        GenerateRequest {
            model: &self.model,
            prompt: request.prompt_text(),
            system: request.system_text(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.request_body(&request);

        debug!(url = %self.url(), model = %self.model, "Sending generate request");

        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::from_reqwest(PROVIDER, self.timeout, e))?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, self.timeout, e))?;

        Ok(CompletionResponse {
            content: parsed.response.trim().to_string(),
            provider: PROVIDER.to_string(),
            model: self.model.clone(),
        })
    }
}
