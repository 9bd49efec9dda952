//! Message sweep pipeline.
//!
//! Every message flows through:
//! 1. `RulesEngine::evaluate()`: declarative rules, no LLM
//! 2. `Classifier::classify()`: local model, remote fallback
//! 3. `Decision`: handed back to the caller to apply against the mailbox
//!
//! **No delete path on uncertainty.** Classifier failures become `review`.

pub mod classifier;
pub mod processor;
pub mod query;
pub mod rules;
pub mod types;
