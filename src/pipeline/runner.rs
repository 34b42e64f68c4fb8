//! Batch runner: classify and label candidate messages one at a time.
//!
//! Per message, in input order:
//! 1. `Classifier::classify()` (never fails)
//! 2. `LabelSink::resolve_label()` for the verdict's category
//! 3. `LabelSink::apply_label()` if resolution succeeded
//! 4. record an `Outcome`, whatever happened in 2-3
//!
//! A failing item never stops the batch. A shutdown request is honoured
//! between messages only, so an item that has started always finishes.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::pipeline::classifier::Classifier;
use crate::pipeline::service::ShutdownSignal;
use crate::pipeline::types::{LabelSink, LabelStatus, Message, Outcome, RunSummary};

/// Subject characters shown in per-message log lines.
const LOG_SUBJECT_CHARS: usize = 50;

pub struct BatchRunner {
    classifier: Arc<Classifier>,
    labels: Arc<dyn LabelSink>,
    shutdown: Option<Arc<ShutdownSignal>>,
}

impl BatchRunner {
    pub fn new(classifier: Arc<Classifier>, labels: Arc<dyn LabelSink>) -> Self {
        Self {
            classifier,
            labels,
            shutdown: None,
        }
    }

    /// Stop between messages once `shutdown` is triggered.
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownSignal>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Process `messages` in order and return one outcome per processed
    /// message. Duplicate ids within the batch are processed once.
    pub async fn run(&self, messages: Vec<Message>) -> Vec<Outcome> {
        let count = messages.len();
        info!(count, "Processing message batch");

        let mut seen: HashSet<String> = HashSet::with_capacity(count);
        let mut outcomes = Vec::with_capacity(count);

        for message in messages {
            if self.shutdown_requested() {
                warn!(
                    processed = outcomes.len(),
                    total = count,
                    "Shutdown requested, stopping batch between messages"
                );
                break;
            }

            if !seen.insert(message.id.clone()) {
                warn!(id = %message.id, "Duplicate message in batch, skipping");
                continue;
            }

            outcomes.push(self.process_one(message).await);
        }

        let summary = RunSummary::from_outcomes(&outcomes);
        info!(
            processed = summary.total,
            labeled = summary.labeled,
            label_failures = summary.label_failures,
            degraded = summary.degraded,
            total = count,
            "Batch processing complete"
        );
        outcomes
    }

    async fn process_one(&self, message: Message) -> Outcome {
        let verdict = self.classifier.classify(&message).await;
        let label = self.label(&message, verdict.category.label_name()).await;

        match &label {
            LabelStatus::Applied { name, .. } => {
                let subject: String = message.subject.chars().take(LOG_SUBJECT_CHARS).collect();
                info!(
                    id = %message.id,
                    category = verdict.category.as_str(),
                    degraded = verdict.is_degraded(),
                    "{subject}... → {name} ({:.0}%)",
                    verdict.confidence * 100.0
                );
            }
            LabelStatus::ResolveFailed { name, error } => {
                error!(id = %message.id, label = %name, error = %error, "Failed to resolve label");
            }
            LabelStatus::ApplyFailed { name, error, .. } => {
                error!(id = %message.id, label = %name, error = %error, "Failed to apply label");
            }
        }

        Outcome {
            message,
            verdict,
            label,
        }
    }

    async fn label(&self, message: &Message, name: &str) -> LabelStatus {
        let id = match self.labels.resolve_label(name).await {
            Ok(id) => id,
            Err(e) => {
                return LabelStatus::ResolveFailed {
                    name: name.to_string(),
                    error: e.to_string(),
                };
            }
        };

        match self.labels.apply_label(&message.id, &id).await {
            Ok(()) => LabelStatus::Applied {
                name: name.to_string(),
                id,
            },
            Err(e) => LabelStatus::ApplyFailed {
                name: name.to_string(),
                id,
                error: e.to_string(),
            },
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|s| s.is_triggered())
    }
}
