//! Classification pipeline.
//!
//! Every candidate message flows through:
//! 1. `MailboxSource::fetch_unlabeled()` (recent mail with no category label)
//! 2. `Classifier::classify()` (prompt, paced completion call, parse)
//! 3. `LabelSink::resolve_label()` + `apply_label()`
//!
//! **Classification never fails.** Errors degrade to an `other` verdict and
//! a failing item never stops the batch.

pub mod classifier;
pub mod parser;
pub mod prompt;
pub mod runner;
pub mod service;
pub mod types;
