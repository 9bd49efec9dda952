//! Classifier client: asks a language model whether a message should be
//! deleted, reviewed or kept.
//!
//! **Core invariant: an indeterminate signal never deletes.** Transport
//! failures and unparseable answers both come back as `review`.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ClassifierConfig;
use crate::error::{ClassifyError, LlmError};
use crate::llm::{self, ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{Classification, Message, Verdict};

/// Body characters sent to the model.
const SNIPPET_CHARS: usize = 200;

/// Room for one keyword plus a little chatter.
const CLASSIFY_MAX_TOKENS: u32 = 16;

const CLASSIFY_TEMPERATURE: f32 = 0.0;

static VERDICT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(delete|review|keep)\b").unwrap());

/// Input to a single classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub sender: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl From<&Message> for ClassificationRequest {
    fn from(message: &Message) -> Self {
        Self {
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        }
    }
}

pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    /// Build the Ollama (+ optional OpenAI fallback) chain from config.
    pub fn new(config: &ClassifierConfig) -> Result<Self, LlmError> {
        let llm: Arc<dyn LlmProvider> = llm::create_provider(config)?;
        Ok(Self { llm })
    }

    /// Use an existing provider (tests, custom backends).
    pub fn with_provider(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub async fn classify(&self, sender: &str, subject: &str, body: &str) -> Classification {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(sender, subject, body)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    sender = %sender,
                    error = %e,
                    "Classification unavailable, defaulting to review"
                );
                return Classification {
                    decision: Verdict::Review,
                    raw_model_output: None,
                    provider: None,
                    issue: Some(ClassifyError::Unavailable {
                        reason: e.to_string(),
                    }),
                };
            }
        };

        debug!(
            provider = %response.provider,
            raw = %response.content,
            "Model answered"
        );

        let (decision, issue) = match parse_verdict(&response.content) {
            Ok(verdict) => (verdict, None),
            Err(e) => {
                warn!(
                    sender = %sender,
                    raw = %response.content,
                    error = %e,
                    "Ambiguous classification, defaulting to review"
                );
                (Verdict::Review, Some(e))
            }
        };

        info!(
            sender = %sender,
            decision = %decision,
            provider = %response.provider,
            "Classified message"
        );

        Classification {
            decision,
            raw_model_output: Some(response.content),
            provider: Some(response.provider),
            issue,
        }
    }

    pub async fn classify_request(&self, request: &ClassificationRequest) -> Classification {
        self.classify(&request.sender, &request.subject, &request.body)
            .await
    }
}

fn build_system_prompt() -> &'static str {
    "You are an email cleanup classifier. You decide whether an email can be \
     deleted, needs a human to review it, or should be kept. Answer with a \
     single word."
}

fn build_user_prompt(sender: &str, subject: &str, body: &str) -> String {
    let snippet: String = body.chars().take(SNIPPET_CHARS).collect();
    format!(
        "Classify this email. Respond with exactly one of: delete, review, keep.\n\
         \n\
         delete: promotional, expired or junk mail nobody needs\n\
         review: unsure, or it might matter to the recipient\n\
         keep: personal, important, receipts or records\n\
         \n\
         Sender: {sender}\n\
         Subject: {subject}\n\
         Body: {snippet}\n\
         \n\
         Decision:"
    )
}

/// Find the decision keyword in free model text.
///
/// Exactly one distinct keyword must appear (case-insensitive, whole word);
/// none or several is ambiguous.
pub fn parse_verdict(text: &str) -> Result<Verdict, ClassifyError> {
    let found: BTreeSet<&'static str> = VERDICT_RE
        .find_iter(text)
        .filter_map(|m| {
            Verdict::ALL
                .iter()
                .map(Verdict::as_str)
                .find(|k| k.eq_ignore_ascii_case(m.as_str()))
        })
        .collect();

    let mut verdicts = Verdict::ALL
        .into_iter()
        .filter(|v| found.contains(v.as_str()));

    match (verdicts.next(), verdicts.next()) {
        (Some(verdict), None) => Ok(verdict),
        (None, _) => Err(ClassifyError::Ambiguous {
            reason: "response contained no decision keyword".into(),
        }),
        (Some(_), Some(_)) => Err(ClassifyError::Ambiguous {
            reason: format!(
                "response contained conflicting keywords: {}",
                found.iter().copied().collect::<Vec<_>>().join(", ")
            ),
        }),
    }
}
