//! In-process mailbox used by tests and dry runs.
//!
//! Behaves like the real mailbox from the pipeline's point of view: label
//! resolution is idempotent, applying a label removes the message from the
//! unlabeled set, and the lookback window is honoured.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::MailboxError;
use crate::pipeline::types::{Category, LabelSink, MailboxSource, Message};

struct StoredMessage {
    message: Message,
    received_at: DateTime<Utc>,
    label_ids: Vec<String>,
    apply_calls: usize,
}

#[derive(Default)]
struct State {
    /// Insertion order is fetch order.
    messages: Vec<StoredMessage>,
    /// Label name → id.
    labels: HashMap<String, String>,
    fail_resolve: HashSet<String>,
    fail_apply: HashSet<String>,
    fail_fetch: bool,
}

#[derive(Default)]
pub struct MemoryMailbox {
    state: Mutex<State>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message received now.
    pub async fn insert(&self, message: Message) {
        self.insert_at(message, Utc::now()).await;
    }

    pub async fn insert_at(&self, message: Message, received_at: DateTime<Utc>) {
        self.state.lock().await.messages.push(StoredMessage {
            message,
            received_at,
            label_ids: Vec::new(),
            apply_calls: 0,
        });
    }

    /// Names of the labels currently on `message_id`.
    pub async fn labels_on(&self, message_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let Some(stored) = state.messages.iter().find(|m| m.message.id == message_id) else {
            return Vec::new();
        };
        stored
            .label_ids
            .iter()
            .filter_map(|id| {
                state
                    .labels
                    .iter()
                    .find(|(_, v)| *v == id)
                    .map(|(name, _)| name.clone())
            })
            .collect()
    }

    /// Successful `apply_label` calls made for `message_id`.
    pub async fn apply_calls(&self, message_id: &str) -> usize {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .find(|m| m.message.id == message_id)
            .map_or(0, |m| m.apply_calls)
    }

    /// Make `resolve_label(name)` fail from now on.
    pub async fn fail_resolve(&self, name: &str) {
        self.state.lock().await.fail_resolve.insert(name.to_string());
    }

    /// Make `apply_label` fail for `message_id` from now on.
    pub async fn fail_apply(&self, message_id: &str) {
        self.state
            .lock()
            .await
            .fail_apply
            .insert(message_id.to_string());
    }

    pub async fn fail_fetch(&self, fail: bool) {
        self.state.lock().await.fail_fetch = fail;
    }
}

#[async_trait]
impl MailboxSource for MemoryMailbox {
    async fn fetch_unlabeled(
        &self,
        lookback_days: u32,
        max_count: usize,
    ) -> Result<Vec<Message>, MailboxError> {
        let state = self.state.lock().await;
        if state.fail_fetch {
            return Err(MailboxError::Api {
                status: 503,
                message: "mailbox unavailable".into(),
            });
        }

        let cutoff = Utc::now() - Duration::days(i64::from(lookback_days));
        let owned: HashSet<&str> = Category::all_label_names()
            .into_iter()
            .filter_map(|name| state.labels.get(name).map(String::as_str))
            .collect();

        Ok(state
            .messages
            .iter()
            .filter(|m| m.received_at >= cutoff)
            .filter(|m| !m.label_ids.iter().any(|id| owned.contains(id.as_str())))
            .take(max_count)
            .map(|m| m.message.clone())
            .collect())
    }
}

#[async_trait]
impl LabelSink for MemoryMailbox {
    async fn resolve_label(&self, name: &str) -> Result<String, MailboxError> {
        let mut state = self.state.lock().await;
        if state.fail_resolve.contains(name) {
            return Err(MailboxError::Api {
                status: 500,
                message: format!("cannot create label {name}"),
            });
        }
        let next = format!("Label_{}", state.labels.len() + 1);
        Ok(state.labels.entry(name.to_string()).or_insert(next).clone())
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError> {
        let mut state = self.state.lock().await;
        if state.fail_apply.contains(message_id) {
            return Err(MailboxError::Api {
                status: 500,
                message: "modify failed".into(),
            });
        }
        if !state.labels.values().any(|id| id == label_id) {
            return Err(MailboxError::Api {
                status: 400,
                message: format!("unknown label {label_id}"),
            });
        }
        let stored = state
            .messages
            .iter_mut()
            .find(|m| m.message.id == message_id)
            .ok_or_else(|| MailboxError::MessageNotFound(message_id.to_string()))?;

        if !stored.label_ids.iter().any(|id| id == label_id) {
            stored.label_ids.push(label_id.to_string());
        }
        stored.apply_calls += 1;
        Ok(())
    }
}
