//! Shared types for the classification pipeline.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailboxError;

// ── Message ─────────────────────────────────────────────────────────

/// A candidate email as fetched from the mailbox.
///
/// Immutable once fetched; the pipeline never persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Mailbox-unique message id.
    pub id: String,
    pub subject: String,
    pub sender: String,
    /// Raw `Date` header.
    pub date: String,
    /// Short preview text.
    pub snippet: String,
    /// Plain-text body (truncated again before prompting).
    pub body: String,
}

// ── Category ────────────────────────────────────────────────────────

/// Closed set of classification outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ApplicationSubmitted,
    FollowupRequired,
    Other,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::ApplicationSubmitted,
        Category::FollowupRequired,
        Category::Other,
    ];

    /// Token the model is asked to answer with.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApplicationSubmitted => "application_submitted",
            Self::FollowupRequired => "followup_required",
            Self::Other => "other",
        }
    }

    /// Mailbox label applied for this category.
    pub fn label_name(self) -> &'static str {
        match self {
            Self::ApplicationSubmitted => "🚀 Seeds Planted",
            Self::FollowupRequired => "⚡ Action Required",
            Self::Other => "📦 Inbox Clutter",
        }
    }

    /// Case-insensitive match against the category tokens.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(token))
    }

    /// Every label name the system owns; messages carrying any of them are
    /// no longer candidates.
    pub fn all_label_names() -> [&'static str; 3] {
        Self::ALL.map(Category::label_name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Verdict ─────────────────────────────────────────────────────────

/// How a verdict came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Parsed from a model response.
    Model,
    /// The completion call failed with a non-throttling error.
    ClassificationFailed,
    /// Every retry was rate limited.
    RateLimited,
}

/// Classifier output for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub category: Category,
    /// Model-reported confidence. Nominally 0.0-1.0 but passed through as
    /// reported.
    pub confidence: f32,
    pub reason: String,
    pub source: VerdictSource,
}

impl Verdict {
    /// Reason recorded when the completion call fails outright.
    pub const FAILED_REASON: &'static str = "Classification failed";
    /// Reason recorded when retries are exhausted under rate limiting.
    pub const RATE_LIMITED_REASON: &'static str = "Rate limited - will retry later";

    /// Degraded verdict for a hard call failure.
    pub fn classification_failed() -> Self {
        Self {
            category: Category::Other,
            confidence: 0.5,
            reason: Self::FAILED_REASON.to_string(),
            source: VerdictSource::ClassificationFailed,
        }
    }

    /// Degraded verdict after exhausting rate-limit retries.
    pub fn rate_limited() -> Self {
        Self {
            category: Category::Other,
            confidence: 0.5,
            reason: Self::RATE_LIMITED_REASON.to_string(),
            source: VerdictSource::RateLimited,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.source != VerdictSource::Model
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// What happened to the label for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelStatus {
    /// Label resolved and applied.
    Applied { name: String, id: String },
    /// The label id could not be resolved or created.
    ResolveFailed { name: String, error: String },
    /// The label id was resolved but applying it failed.
    ApplyFailed {
        name: String,
        id: String,
        error: String,
    },
}

impl LabelStatus {
    pub fn label_name(&self) -> &str {
        match self {
            Self::Applied { name, .. }
            | Self::ResolveFailed { name, .. }
            | Self::ApplyFailed { name, .. } => name,
        }
    }
}

/// Per-message record produced by the batch runner.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub message: Message,
    pub verdict: Verdict,
    pub label: LabelStatus,
}

impl Outcome {
    /// Name of the label actually applied, if any.
    pub fn applied_label(&self) -> Option<&str> {
        match &self.label {
            LabelStatus::Applied { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Aggregate view over one run's outcomes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub labeled: usize,
    pub label_failures: usize,
    pub degraded: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            *summary
                .by_category
                .entry(outcome.verdict.category)
                .or_default() += 1;
            if outcome.applied_label().is_some() {
                summary.labeled += 1;
            } else {
                summary.label_failures += 1;
            }
            if outcome.verdict.is_degraded() {
                summary.degraded += 1;
            }
        }
        summary
    }

    pub fn count(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

// ── Collaborators ───────────────────────────────────────────────────

/// Source of candidate messages.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    /// Messages from the last `lookback_days` that carry none of the
    /// system's labels, at most `max_count` of them. Order is unspecified
    /// but stable for a given call.
    async fn fetch_unlabeled(
        &self,
        lookback_days: u32,
        max_count: usize,
    ) -> Result<Vec<Message>, MailboxError>;
}

/// Label store on the mailbox side.
#[async_trait]
pub trait LabelSink: Send + Sync {
    /// Id of the label called `name`, creating it if needed. Idempotent.
    async fn resolve_label(&self, name: &str) -> Result<String, MailboxError>;

    /// Attach `label_id` to `message_id`.
    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError>;
}
