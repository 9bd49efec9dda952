//! mailsweep: mailbox cleanup rules and LLM classification.

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod server;
