//! Sweep processor: decides what happens to each message.
//!
//! **Core invariant: nothing is deleted on an indeterminate signal.**
//! Classifier failures land in the review label, never in the trash.
//!
//! Flow:
//! 1. Rules engine (fast, no LLM) → may decide
//! 2. Classifier → `delete`, `review` or `keep`
//! 3. Decision → returned to the caller, which applies it to the mailbox

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{
    Classification, Decision, DecisionAction, DecisionSource, Message, ProcessedMessage,
    SweepReport, Verdict,
};

pub struct SweepProcessor {
    rules: RulesEngine,
    /// `None` runs rules only; unmatched messages are kept.
    classifier: Option<Arc<Classifier>>,
    review_label: String,
}

impl SweepProcessor {
    pub fn new(
        rules: RulesEngine,
        classifier: Option<Arc<Classifier>>,
        review_label: impl Into<String>,
    ) -> Self {
        Self {
            rules,
            classifier,
            review_label: review_label.into(),
        }
    }

    pub fn rules(&self) -> &RulesEngine {
        &self.rules
    }

    /// Process one message at time `now`.
    pub async fn process(
        &self,
        message: &Message,
        now: DateTime<Utc>,
    ) -> Result<ProcessedMessage, PipelineError> {
        if message.id.trim().is_empty() {
            return Err(PipelineError::InvalidMessage(format!(
                "message from {} has no id",
                message.sender
            )));
        }

        info!(id = %message.id, sender = %message.sender, "Processing message");

        // Step 1: Rules engine
        let decisions = self.rules.evaluate(message, now)?;
        if !decisions.is_empty() {
            debug!(
                id = %message.id,
                matched = decisions.len(),
                "Rules engine matched, skipping classifier"
            );
            return Ok(ProcessedMessage {
                message_id: message.id.clone(),
                decisions,
                classification: None,
            });
        }

        // Step 2: Classifier
        let Some(classifier) = &self.classifier else {
            debug!(id = %message.id, "No rule matched and classifier disabled, keeping");
            return Ok(ProcessedMessage {
                message_id: message.id.clone(),
                decisions: vec![self.classifier_decision(message, Verdict::Keep)],
                classification: None,
            });
        };

        let classification = classifier
            .classify(&message.sender, &message.subject, &message.body)
            .await;

        Ok(self.from_classification(message, classification))
    }

    /// Process a batch sequentially.
    ///
    /// Failures on individual messages are logged but don't fail the batch.
    /// Configuration errors (bad rule queries) do, since every message
    /// would hit them.
    pub async fn process_batch(
        &self,
        messages: &[Message],
        now: DateTime<Utc>,
    ) -> Result<SweepReport, PipelineError> {
        let count = messages.len();
        info!(count, "Processing message batch");

        self.rules.compile()?;

        let mut results = Vec::with_capacity(count);
        for message in messages {
            match self.process(message, now).await {
                Ok(processed) => results.push(processed),
                Err(e) => {
                    error!(id = %message.id, error = %e, "Failed to process message in batch");
                }
            }
        }

        let report = SweepReport::new(results);
        info!(
            run_id = %report.run_id,
            processed = report.summary.messages,
            total = count,
            delete = report.summary.delete,
            label = report.summary.label,
            keep = report.summary.keep,
            "Batch processing complete"
        );
        Ok(report)
    }

    fn from_classification(
        &self,
        message: &Message,
        classification: Classification,
    ) -> ProcessedMessage {
        let decision = self.classifier_decision(message, classification.decision);
        ProcessedMessage {
            message_id: message.id.clone(),
            decisions: vec![decision],
            classification: Some(classification),
        }
    }

    fn classifier_decision(&self, message: &Message, verdict: Verdict) -> Decision {
        let action = match verdict {
            Verdict::Delete => DecisionAction::Delete,
            Verdict::Review => DecisionAction::Label {
                label: self.review_label.clone(),
            },
            Verdict::Keep => DecisionAction::Keep,
        };
        Decision {
            message_id: message.id.clone(),
            action,
            source: DecisionSource::Classifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::pipeline::rules::RuleSet;

    const RULES: &str = r#"
[[rules]]
name = "Old Promotions"
query = "category:promotions older_than:30d"
action = "delete"

[[rules]]
name = "Unread Review"
query = "is:unread"
action = "review"
label = "NeedsReview"
"#;

    struct CountingLlm {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for CountingLlm {
        fn name(&self) -> &str {
            "counting"
        }
        fn model_name(&self) -> &str {
            "counting"
        }
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(text) => Ok(CompletionResponse {
                    content: text.into(),
                    provider: "counting".into(),
                    model: "counting".into(),
                }),
                None => Err(LlmError::Timeout {
                    provider: "counting".into(),
                    timeout: std::time::Duration::from_secs(30),
                }),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn make_message(id: &str, labels: &[&str], age_days: i64) -> Message {
        Message {
            id: id.into(),
            sender: "someone@example.com".into(),
            to: vec![],
            subject: "Hello".into(),
            body: "Body".into(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            received_at: now() - Duration::days(age_days),
            has_attachment: false,
        }
    }

    fn processor(reply: Option<&'static str>) -> (SweepProcessor, Arc<CountingLlm>) {
        let llm = Arc::new(CountingLlm {
            reply,
            calls: AtomicUsize::new(0),
        });
        let classifier = Arc::new(Classifier::with_provider(llm.clone()));
        let rules = RulesEngine::new(RuleSet::from_toml_str(RULES).unwrap());
        (SweepProcessor::new(rules, Some(classifier), "AI/Review"), llm)
    }

    #[tokio::test]
    async fn rule_match_skips_classifier() {
        let (processor, llm) = processor(Some("keep"));
        let msg = make_message("m1", &["CATEGORY_PROMOTIONS"], 60);
        let processed = processor.process(&msg, now()).await.unwrap();
        assert_eq!(processed.decisions[0].action, DecisionAction::Delete);
        assert!(processed.classification.is_none());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmatched_message_is_classified() {
        let (processor, llm) = processor(Some("delete"));
        let msg = make_message("m2", &["INBOX"], 1);
        let processed = processor.process(&msg, now()).await.unwrap();
        assert_eq!(processed.decisions[0].action, DecisionAction::Delete);
        assert_eq!(processed.decisions[0].source, DecisionSource::Classifier);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn classifier_timeout_labels_for_review() {
        let (processor, _llm) = processor(None);
        let msg = make_message("m3", &["INBOX"], 1);
        let processed = processor.process(&msg, now()).await.unwrap();
        assert_eq!(
            processed.decisions[0].action,
            DecisionAction::Label {
                label: "AI/Review".into()
            }
        );
        assert!(processed.classification.unwrap().is_unavailable());
    }

    #[tokio::test]
    async fn no_classifier_keeps_unmatched() {
        let rules = RulesEngine::new(RuleSet::from_toml_str(RULES).unwrap());
        let processor = SweepProcessor::new(rules, None, "AI/Review");
        let processed = processor
            .process(&make_message("m4", &[], 1), now())
            .await
            .unwrap();
        assert_eq!(processed.decisions[0].action, DecisionAction::Keep);
    }

    #[tokio::test]
    async fn batch_skips_invalid_messages() {
        let (processor, _llm) = processor(Some("keep"));
        let messages = vec![
            make_message("a", &["UNREAD"], 1),
            make_message("", &[], 1),
            make_message("c", &["INBOX"], 1),
        ];
        let report = processor.process_batch(&messages, now()).await.unwrap();
        assert_eq!(report.summary.messages, 2);
        assert_eq!(report.summary.label, 1);
        assert_eq!(report.summary.keep, 1);
        assert_eq!(report.summary.classified, 1);
    }

    #[tokio::test]
    async fn batch_fails_fast_on_bad_query() {
        let toml = "[[rules]]\nname = \"big\"\nquery = \"larger:10M\"\naction = \"delete\"\n";
        let rules = RulesEngine::new(RuleSet::from_toml_str(toml).unwrap());
        let processor = SweepProcessor::new(rules, None, "AI/Review");
        let err = processor
            .process_batch(&[make_message("a", &[], 1)], now())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Rules(_)));
    }
}
