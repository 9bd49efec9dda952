//! Declarative cleanup rules and the rules engine.
//!
//! A rule pairs a Gmail search query with an action. In production the mail
//! provider executes each query and hands back a result set; the engine
//! turns those result sets into decisions. For offline runs the engine can
//! also match messages itself through [`CompiledQuery`].
//!
//! Precedence: rules are ordered, and in `first_match` mode (the default) a
//! message selected by several rules is decided by the first-listed one.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::pipeline::query::CompiledQuery;
use crate::pipeline::types::{Decision, DecisionAction, DecisionSource, Message, RuleAction};

/// A single cleanup rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// Gmail search expression. Opaque to the engine unless matched offline.
    pub query: String,
    pub action: RuleAction,
    /// Label to apply for `review`. Required for that action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Rule {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.trim().is_empty() {
            return Err(ConfigError::InvalidRule {
                rule: self.name.clone(),
                message: "query must not be empty".into(),
            });
        }
        self.decision_action().map(|_| ())
    }

    /// The mailbox action this rule produces.
    pub fn decision_action(&self) -> Result<DecisionAction, ConfigError> {
        match self.action {
            RuleAction::Delete => Ok(DecisionAction::Delete),
            RuleAction::Review => match self.label.as_deref().map(str::trim) {
                Some(label) if !label.is_empty() => Ok(DecisionAction::Label {
                    label: label.to_string(),
                }),
                _ => Err(ConfigError::InvalidRule {
                    rule: self.name.clone(),
                    message: "action 'review' requires a non-empty label".into(),
                }),
            },
        }
    }
}

/// How many rules may decide a single message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    FirstMatch,
    AllMatches,
}

/// An ordered rule list, as read from a rules file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleSet {
    pub match_mode: MatchMode,
    pub rules: Vec<Rule>,
}

/// On-disk shape. Every field optional so missing ones get a named error.
#[derive(Debug, Deserialize)]
struct RawRuleSet {
    #[serde(default)]
    match_mode: MatchMode,
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    name: Option<String>,
    query: Option<String>,
    action: Option<RuleAction>,
    label: Option<String>,
}

impl RuleSet {
    /// Load a rules file. `.json` is parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let rule_set = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        debug!(
            path = %path.display(),
            rules = rule_set.rules.len(),
            mode = ?rule_set.match_mode,
            "Loaded rules file"
        );
        Ok(rule_set)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawRuleSet =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawRuleSet =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawRuleSet) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(raw.rules.len());
        for (i, entry) in raw.rules.into_iter().enumerate() {
            let name = entry
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("rule-{}", i + 1));
            let query = entry.query.ok_or_else(|| ConfigError::InvalidRule {
                rule: name.clone(),
                message: "missing required field 'query'".into(),
            })?;
            let action = entry.action.ok_or_else(|| ConfigError::InvalidRule {
                rule: name.clone(),
                message: "missing required field 'action'".into(),
            })?;
            let rule = Rule {
                name,
                query,
                action,
                label: entry.label,
            };
            rule.validate()?;
            if rules.iter().any(|r: &Rule| r.name == rule.name) {
                return Err(ConfigError::InvalidRule {
                    rule: rule.name,
                    message: "duplicate rule name".into(),
                });
            }
            rules.push(rule);
        }
        Ok(Self {
            match_mode: raw.match_mode,
            rules,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Messages the provider returned for one rule's query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub rule: String,
    pub message_ids: Vec<String>,
}

/// Turns rules into decisions. Never touches the mailbox itself.
pub struct RulesEngine {
    rule_set: RuleSet,
    /// Compiled on first offline evaluation.
    queries: OnceLock<Vec<CompiledQuery>>,
}

impl RulesEngine {
    pub fn new(rule_set: RuleSet) -> Self {
        Self {
            rule_set,
            queries: OnceLock::new(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rule_set.rules
    }

    pub fn match_mode(&self) -> MatchMode {
        self.rule_set.match_mode
    }

    pub fn is_empty(&self) -> bool {
        self.rule_set.rules.is_empty()
    }

    /// Decision for a message that appeared in `rule`'s result set.
    pub fn decide(rule: &Rule, message_id: &str) -> Result<Decision, ConfigError> {
        Ok(Decision {
            message_id: message_id.to_string(),
            action: rule.decision_action()?,
            source: DecisionSource::Rule {
                name: rule.name.clone(),
            },
        })
    }

    /// Resolve provider-executed result sets into decisions, applying rule
    /// precedence when a message shows up under several rules.
    ///
    /// Output follows rule order, then result order within a rule.
    pub fn resolve_search_results(
        &self,
        results: &[SearchResult],
    ) -> Result<Vec<Decision>, ConfigError> {
        let index: HashMap<&str, usize> = self
            .rule_set
            .rules
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect();

        let mut ordered: Vec<(usize, &SearchResult)> = Vec::with_capacity(results.len());
        for result in results {
            let i = *index.get(result.rule.as_str()).ok_or_else(|| {
                ConfigError::MissingRequired {
                    key: format!("rule '{}'", result.rule),
                    hint: "Search result refers to a rule that is not in the rules file.".into(),
                }
            })?;
            ordered.push((i, result));
        }
        ordered.sort_by_key(|(i, _)| *i);

        let mut seen: HashSet<&str> = HashSet::new();
        let mut decisions = Vec::new();
        for (i, result) in ordered {
            let rule = &self.rule_set.rules[i];
            for id in &result.message_ids {
                let first = seen.insert(id.as_str());
                if !first && self.rule_set.match_mode == MatchMode::FirstMatch {
                    debug!(
                        message_id = %id,
                        rule = %rule.name,
                        "Already decided by an earlier rule"
                    );
                    continue;
                }
                decisions.push(Self::decide(rule, id)?);
            }
        }
        Ok(decisions)
    }

    /// Match `message` locally against every rule's query.
    ///
    /// Returns at most one decision in `first_match` mode. An empty result
    /// means no rule is conclusive.
    pub fn evaluate(
        &self,
        message: &Message,
        now: DateTime<Utc>,
    ) -> Result<Vec<Decision>, ConfigError> {
        let queries = self.queries()?;
        let mut decisions = Vec::new();

        for (rule, query) in self.rule_set.rules.iter().zip(queries) {
            if !query.matches(message, now) {
                continue;
            }
            debug!(
                id = %message.id,
                sender = %message.sender,
                rule = %rule.name,
                action = ?rule.action,
                "Message matched rule"
            );
            decisions.push(Self::decide(rule, &message.id)?);
            if self.rule_set.match_mode == MatchMode::FirstMatch {
                break;
            }
        }
        Ok(decisions)
    }

    /// Compile every query up front; errors name the offending rule.
    pub fn compile(&self) -> Result<(), ConfigError> {
        self.queries().map(|_| ())
    }

    fn queries(&self) -> Result<&[CompiledQuery], ConfigError> {
        if let Some(q) = self.queries.get() {
            return Ok(q.as_slice());
        }
        let compiled = self
            .rule_set
            .rules
            .iter()
            .map(|rule| {
                CompiledQuery::parse(&rule.query).map_err(|source| ConfigError::InvalidQuery {
                    rule: rule.name.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.queries.get_or_init(|| compiled).as_slice())
    }
}
