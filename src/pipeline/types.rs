//! Shared types for the sweep pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClassifyError;

// ── Message ─────────────────────────────────────────────────────────

/// Read-only projection of a mailbox message.
///
/// Owned by the mail provider; the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Provider message id.
    pub id: String,
    /// Sender address (may include a display name).
    pub sender: String,
    /// Recipient addresses.
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    /// Body snippet or full text.
    #[serde(default)]
    pub body: String,
    /// Provider label ids, e.g. `UNREAD`, `INBOX`, `CATEGORY_PROMOTIONS`.
    #[serde(default)]
    pub labels: Vec<String>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub has_attachment: bool,
}

impl Message {
    /// Case-insensitive label check.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// What a rule does with the messages it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Delete,
    Review,
}

/// Classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Delete,
    Review,
    Keep,
}

impl Verdict {
    pub const ALL: [Verdict; 3] = [Verdict::Delete, Verdict::Review, Verdict::Keep];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Review => "review",
            Self::Keep => "keep",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a classifier call. Always carries a usable verdict; `issue`
/// records why it fell back to `review`, if it did.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub decision: Verdict,
    /// Raw model text, absent when no model answered.
    pub raw_model_output: Option<String>,
    /// Provider that answered ("ollama", "openai").
    pub provider: Option<String>,
    #[serde(serialize_with = "serialize_issue")]
    pub issue: Option<ClassifyError>,
}

fn serialize_issue<S>(issue: &Option<ClassifyError>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match issue {
        Some(err) => serde_json::json!({ "kind": err.kind(), "message": err.to_string() }).serialize(s),
        None => s.serialize_none(),
    }
}

impl Classification {
    pub fn is_unavailable(&self) -> bool {
        matches!(self.issue, Some(ClassifyError::Unavailable { .. }))
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// The side effect the caller should apply against the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DecisionAction {
    Delete,
    Label { label: String },
    Keep,
}

impl DecisionAction {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Label { .. } => "label",
            Self::Keep => "keep",
        }
    }
}

/// Where a decision came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionSource {
    Rule { name: String },
    Classifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub message_id: String,
    #[serde(flatten)]
    pub action: DecisionAction,
    pub source: DecisionSource,
}

// ── Report ──────────────────────────────────────────────────────────

/// Result of processing one message.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedMessage {
    pub message_id: String,
    pub decisions: Vec<Decision>,
    /// Present when the classifier was consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub messages: usize,
    pub delete: usize,
    pub label: usize,
    pub keep: usize,
    pub classified: usize,
    pub classification_issues: usize,
}

/// Everything a run decided, for the caller to execute.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<ProcessedMessage>,
    pub summary: SweepSummary,
}

impl SweepReport {
    pub fn new(results: Vec<ProcessedMessage>) -> Self {
        let mut summary = SweepSummary {
            messages: results.len(),
            ..SweepSummary::default()
        };
        for processed in &results {
            for decision in &processed.decisions {
                match decision.action {
                    DecisionAction::Delete => summary.delete += 1,
                    DecisionAction::Label { .. } => summary.label += 1,
                    DecisionAction::Keep => summary.keep += 1,
                }
            }
            if let Some(c) = &processed.classification {
                summary.classified += 1;
                if c.issue.is_some() {
                    summary.classification_issues += 1;
                }
            }
        }
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            results,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(labels: &[&str]) -> Message {
        Message {
            id: "m1".into(),
            sender: "alice@example.com".into(),
            to: vec![],
            subject: "hi".into(),
            body: String::new(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            received_at: Utc::now(),
            has_attachment: false,
        }
    }

    #[test]
    fn label_check_ignores_case() {
        let msg = message(&["UNREAD", "CATEGORY_PROMOTIONS"]);
        assert!(msg.has_label("unread"));
        assert!(msg.has_label("category_promotions"));
        assert!(!msg.has_label("STARRED"));
    }

    #[test]
    fn message_minimal_json() {
        let msg: Message = serde_json::from_str(
            r#"{"id":"x","sender":"a@b.c","received_at":"2026-01-01T00:00:00Z","extra":1}"#,
        )
        .unwrap();
        assert!(msg.labels.is_empty());
        assert!(msg.subject.is_empty());
    }

    #[test]
    fn decision_serialization() {
        let decision = Decision {
            message_id: "m1".into(),
            action: DecisionAction::Label {
                label: "NeedsReview".into(),
            },
            source: DecisionSource::Rule {
                name: "Unread Review".into(),
            },
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["action"], "label");
        assert_eq!(json["label"], "NeedsReview");
        assert_eq!(json["source"]["kind"], "rule");
        assert_eq!(json["source"]["name"], "Unread Review");
    }

    #[test]
    fn classification_issue_serialization() {
        let c = Classification {
            decision: Verdict::Review,
            raw_model_output: None,
            provider: None,
            issue: Some(ClassifyError::Unavailable {
                reason: "refused".into(),
            }),
        };
        assert!(c.is_unavailable());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["decision"], "review");
        assert_eq!(json["issue"]["kind"], "classification_unavailable");
    }

    #[test]
    fn report_summary_counts() {
        let results = vec![
            ProcessedMessage {
                message_id: "a".into(),
                decisions: vec![Decision {
                    message_id: "a".into(),
                    action: DecisionAction::Delete,
                    source: DecisionSource::Rule { name: "r".into() },
                }],
                classification: None,
            },
            ProcessedMessage {
                message_id: "b".into(),
                decisions: vec![Decision {
                    message_id: "b".into(),
                    action: DecisionAction::Keep,
                    source: DecisionSource::Classifier,
                }],
                classification: Some(Classification {
                    decision: Verdict::Keep,
                    raw_model_output: Some("keep".into()),
                    provider: Some("ollama".into()),
                    issue: None,
                }),
            },
        ];
        let report = SweepReport::new(results);
        assert_eq!(report.summary.messages, 2);
        assert_eq!(report.summary.delete, 1);
        assert_eq!(report.summary.keep, 1);
        assert_eq!(report.summary.classified, 1);
        assert_eq!(report.summary.classification_issues, 0);
    }
}
