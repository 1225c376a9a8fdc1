//! Inbox entry type and store interface (§3, §4.3).
//!
//! `id` is the message's own id: the store is naturally keyed so that at
//! most one row exists per message, which is what makes "at most one
//! non-`Duplicate` entry per `message_id`" (§8) true by construction rather
//! than something `fc-inbox` has to police separately.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fc_common::message::Envelope;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub type Payload = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    Duplicate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct InboxOptions {
    pub require_idempotency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: uuid::Uuid,
    pub message: Envelope<Payload>,
    pub options: InboxOptions,
    pub status: InboxStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl InboxEntry {
    pub fn pending(message: Envelope<Payload>, options: InboxOptions, now: DateTime<Utc>) -> Self {
        Self {
            id: message.message_id,
            message,
            options,
            status: InboxStatus::Pending,
            received_at: now,
            processed_at: None,
            error: None,
        }
    }
}

#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn find(&self, id: &uuid::Uuid) -> Option<InboxEntry>;

    /// Inserts iff absent. Returns `false` if an entry for this id already
    /// exists (the caller treats that as "duplicate").
    async fn try_insert_pending(&self, entry: InboxEntry) -> bool;

    /// Overwrites whatever was stored for `id`, used when a duplicate
    /// window has elapsed and the arrival is to be treated as fresh.
    async fn reset_pending(&self, entry: InboxEntry);

    async fn mark_processed(&self, id: &uuid::Uuid, processed_at: DateTime<Utc>) -> bool;
    async fn mark_failed(&self, id: &uuid::Uuid, error: String) -> bool;
    async fn cleanup_processed_before(&self, cutoff: DateTime<Utc>) -> usize;
    async fn count_by_status(&self, status: InboxStatus) -> usize;
}

#[derive(Default)]
pub struct InMemoryInboxStore {
    entries: Arc<Mutex<HashMap<uuid::Uuid, InboxEntry>>>,
}

impl InMemoryInboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InboxStore for InMemoryInboxStore {
    async fn find(&self, id: &uuid::Uuid) -> Option<InboxEntry> {
        self.entries.lock().get(id).cloned()
    }

    async fn try_insert_pending(&self, entry: InboxEntry) -> bool {
        use std::collections::hash_map::Entry;
        match self.entries.lock().entry(entry.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    async fn reset_pending(&self, entry: InboxEntry) {
        self.entries.lock().insert(entry.id, entry);
    }

    async fn mark_processed(&self, id: &uuid::Uuid, processed_at: DateTime<Utc>) -> bool {
        let mut guard = self.entries.lock();
        match guard.get_mut(id) {
            Some(entry) => {
                entry.status = InboxStatus::Processed;
                entry.processed_at = Some(processed_at);
                true
            }
            None => false,
        }
    }

    async fn mark_failed(&self, id: &uuid::Uuid, error: String) -> bool {
        let mut guard = self.entries.lock();
        match guard.get_mut(id) {
            Some(entry) => {
                entry.status = InboxStatus::Failed;
                entry.error = Some(error);
                true
            }
            None => false,
        }
    }

    async fn cleanup_processed_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut guard = self.entries.lock();
        let before = guard.len();
        guard.retain(|_, entry| {
            !(entry.status == InboxStatus::Processed
                && entry.processed_at.map(|at| at < cutoff).unwrap_or(false))
        });
        before - guard.len()
    }

    async fn count_by_status(&self, status: InboxStatus) -> usize {
        self.entries.lock().values().filter(|e| e.status == status).count()
    }
}
