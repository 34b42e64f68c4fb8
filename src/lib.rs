//! jobmail: LLM-backed job-application email labeler.

pub mod config;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
