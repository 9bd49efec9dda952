//! Remote fallback provider speaking OpenAI-style `/chat/completions`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider};

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            timeout,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Temperature defaults to 0 when the request leaves it unset.
    fn request_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature.unwrap_or(0.0),
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.request_body(&request);

        debug!(url = %self.url(), model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::from_reqwest(PROVIDER, self.timeout, e))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, self.timeout, e))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response contained no choices".to_string(),
            })?;

        Ok(CompletionResponse {
            content: content.trim().to_string(),
            provider: PROVIDER.to_string(),
            model: self.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(
            "https://api.openai.com/v1/",
            SecretString::from("sk-test"),
            "gpt-4-turbo",
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn url_joins_base() {
        assert_eq!(provider().url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn parses_first_choice() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" delete "}}]}"#,
        )
        .unwrap();
        let content = parsed.choices[0].message.content.as_deref();
        assert_eq!(content, Some(" delete "));
    }

    #[test]
    fn body_defaults_temperature_to_zero() {
        let provider = provider();
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let json = serde_json::to_value(provider.request_body(&request)).unwrap();
        assert_eq!(json["model"], "gpt-4-turbo");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("max_tokens").is_none());

        let request = request.with_temperature(0.7).with_max_tokens(8);
        let json = serde_json::to_value(provider.request_body(&request)).unwrap();
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(json["max_tokens"], 8);
    }
}
