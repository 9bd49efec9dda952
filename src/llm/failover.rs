//! Primary + optional fallback provider.
//!
//! The fallback gets exactly one attempt, and only after the primary failed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

pub struct FailoverProvider {
    primary: Arc<dyn LlmProvider>,
    fallback: Option<Arc<dyn LlmProvider>>,
}

impl FailoverProvider {
    pub fn new(primary: Arc<dyn LlmProvider>, fallback: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { primary, fallback }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[async_trait]
impl LlmProvider for FailoverProvider {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn model_name(&self) -> &str {
        self.primary.model_name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let primary_err = match self.primary.complete(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };

        warn!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_err,
            "Primary provider failed, trying fallback"
        );

        fallback
            .complete(request)
            .await
            .map_err(|fallback_err| LlmError::AllProvidersFailed {
                primary: primary_err.to_string(),
                fallback: fallback_err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::llm::provider::ChatMessage;

    struct Scripted {
        name: &'static str,
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Some(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(text) => Ok(CompletionResponse {
                    content: text.to_string(),
                    provider: self.name.to_string(),
                    model: "scripted".to_string(),
                }),
                None => Err(LlmError::RequestFailed {
                    provider: self.name.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = Scripted::ok("ollama", "keep");
        let fallback = Scripted::ok("openai", "delete");
        let provider = FailoverProvider::new(primary.clone(), Some(fallback.clone()));

        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.content, "keep");
        assert_eq!(response.provider, "ollama");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn primary_failure_uses_fallback_once() {
        let primary = Scripted::failing("ollama");
        let fallback = Scripted::ok("openai", "review");
        let provider = FailoverProvider::new(primary.clone(), Some(fallback.clone()));

        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.provider, "openai");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn both_failing_reports_both() {
        let primary = Scripted::failing("ollama");
        let fallback = Scripted::failing("openai");
        let provider = FailoverProvider::new(primary, Some(fallback.clone()));

        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::AllProvidersFailed { .. }));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_fallback_returns_primary_error() {
        let provider = FailoverProvider::new(Scripted::failing("ollama"), None);
        assert!(!provider.has_fallback());
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
