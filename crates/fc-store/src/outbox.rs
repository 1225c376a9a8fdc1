//! Outbox entry type and store interface (§3, §4.2).
//!
//! [`OutboxStore`] is the persistence seam the dispatcher in `fc-outbox`
//! polls; this crate only owns the shape and the in-memory reference. The
//! dispatch loop, retry scheduling, and cleanup cadence live in
//! `fc-outbox`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fc_common::message::Envelope;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub type Payload = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxOptions {
    /// Lower value dispatches first (§9 open question, resolved).
    pub priority: i32,
    pub destination: String,
    pub max_retries: u32,
}

impl Default for OutboxOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            destination: String::new(),
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub message: Envelope<Payload>,
    pub options: OutboxOptions,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    pub fn new(message: Envelope<Payload>, options: OutboxOptions, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message,
            options,
            status: OutboxStatus::Pending,
            created_at: now,
            processed_at: None,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
        }
    }

    /// `true` once `status = Processed`, per the "no further mutation"
    /// invariant of §3.
    pub fn is_terminal_success(&self) -> bool {
        self.status == OutboxStatus::Processed
    }

    pub fn is_dispatchable(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending
            && self.next_retry_at.map(|at| at <= now).unwrap_or(true)
    }
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn add(&self, entry: OutboxEntry) -> OutboxEntry;

    async fn get(&self, id: &str) -> Option<OutboxEntry>;

    /// Entries eligible for dispatch right now, ordered `(priority asc,
    /// created_at asc)`, capped at `limit`.
    async fn fetch_dispatchable(&self, limit: usize, now: DateTime<Utc>) -> Vec<OutboxEntry>;

    /// Optimistic: moves `Pending -> Processing` only if the entry is still
    /// `Pending`. Returns `false` (not an error) if another dispatcher won
    /// the race, per §4.2 step 1.
    async fn mark_processing(&self, id: &str) -> bool;

    async fn mark_processed(&self, id: &str, processed_at: DateTime<Utc>) -> bool;

    async fn mark_for_retry(
        &self,
        id: &str,
        retry_count: u32,
        next_retry_at: DateTime<Utc>,
        last_error: String,
    ) -> bool;

    async fn mark_failed(&self, id: &str, last_error: String) -> bool;

    /// Removes `Processed` entries created before `cutoff`. Returns the
    /// count removed.
    async fn cleanup_processed_before(&self, cutoff: DateTime<Utc>) -> usize;

    async fn count_by_status(&self, status: OutboxStatus) -> usize;
}

#[derive(Default)]
pub struct InMemoryOutboxStore {
    entries: Arc<Mutex<HashMap<String, OutboxEntry>>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn add(&self, entry: OutboxEntry) -> OutboxEntry {
        self.entries.lock().insert(entry.id.clone(), entry.clone());
        entry
    }

    async fn get(&self, id: &str) -> Option<OutboxEntry> {
        self.entries.lock().get(id).cloned()
    }

    async fn fetch_dispatchable(&self, limit: usize, now: DateTime<Utc>) -> Vec<OutboxEntry> {
        let guard = self.entries.lock();
        let mut matching: Vec<OutboxEntry> = guard
            .values()
            .filter(|entry| entry.is_dispatchable(now))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.options
                .priority
                .cmp(&b.options.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        matching.truncate(limit);
        matching
    }

    async fn mark_processing(&self, id: &str) -> bool {
        let mut guard = self.entries.lock();
        match guard.get_mut(id) {
            Some(entry) if entry.status == OutboxStatus::Pending => {
                entry.status = OutboxStatus::Processing;
                true
            }
            _ => false,
        }
    }

    async fn mark_processed(&self, id: &str, processed_at: DateTime<Utc>) -> bool {
        let mut guard = self.entries.lock();
        match guard.get_mut(id) {
            Some(entry) if entry.status != OutboxStatus::Processed => {
                entry.status = OutboxStatus::Processed;
                entry.processed_at = Some(processed_at);
                entry.next_retry_at = None;
                true
            }
            _ => false,
        }
    }

    async fn mark_for_retry(
        &self,
        id: &str,
        retry_count: u32,
        next_retry_at: DateTime<Utc>,
        last_error: String,
    ) -> bool {
        let mut guard = self.entries.lock();
        match guard.get_mut(id) {
            Some(entry) if entry.status != OutboxStatus::Processed => {
                entry.status = OutboxStatus::Pending;
                entry.retry_count = retry_count;
                entry.next_retry_at = Some(next_retry_at);
                entry.last_error = Some(last_error);
                true
            }
            _ => false,
        }
    }

    async fn mark_failed(&self, id: &str, last_error: String) -> bool {
        let mut guard = self.entries.lock();
        match guard.get_mut(id) {
            Some(entry) if entry.status != OutboxStatus::Processed => {
                entry.status = OutboxStatus::Failed;
                entry.last_error = Some(last_error);
                entry.next_retry_at = None;
                true
            }
            _ => false,
        }
    }

    async fn cleanup_processed_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut guard = self.entries.lock();
        let before = guard.len();
        guard.retain(|_, entry| {
            !(entry.status == OutboxStatus::Processed
                && entry.processed_at.map(|at| at < cutoff).unwrap_or(false))
        });
        before - guard.len()
    }

    async fn count_by_status(&self, status: OutboxStatus) -> usize {
        self.entries.lock().values().filter(|e| e.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(priority: i32, created_at: DateTime<Utc>) -> OutboxEntry {
        OutboxEntry::new(
            Envelope::command(serde_json::json!({}), created_at),
            OutboxOptions {
                priority,
                destination: "orders".into(),
                max_retries: 3,
            },
            created_at,
        )
    }

    #[tokio::test]
    async fn fetch_dispatchable_orders_by_priority_then_creation() {
        let store = InMemoryOutboxStore::new();
        let now = Utc::now();
        let low_priority = entry(5, now);
        let high_priority = entry(0, now + chrono::Duration::seconds(1));
        store.add(low_priority.clone()).await;
        store.add(high_priority.clone()).await;

        let fetched = store.fetch_dispatchable(10, now + chrono::Duration::seconds(2)).await;
        assert_eq!(fetched[0].id, high_priority.id);
        assert_eq!(fetched[1].id, low_priority.id);
    }

    #[tokio::test]
    async fn processed_entries_are_never_mutated_again() {
        let store = InMemoryOutboxStore::new();
        let now = Utc::now();
        let e = entry(0, now);
        store.add(e.clone()).await;
        assert!(store.mark_processed(&e.id, now).await);
        assert!(!store.mark_for_retry(&e.id, 1, now, "late failure".into()).await);
        assert!(!store.mark_failed(&e.id, "late failure".into()).await);
    }

    #[tokio::test]
    async fn entry_exactly_at_next_retry_at_is_eligible() {
        let store = InMemoryOutboxStore::new();
        let now = Utc::now();
        let mut e = entry(0, now);
        e.next_retry_at = Some(now);
        store.add(e.clone()).await;
        let fetched = store.fetch_dispatchable(10, now).await;
        assert_eq!(fetched.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_only_removes_processed_before_cutoff() {
        let store = InMemoryOutboxStore::new();
        let now = Utc::now();
        let e = entry(0, now);
        store.add(e.clone()).await;
        store.mark_processed(&e.id, now).await;
        assert_eq!(store.cleanup_processed_before(now - chrono::Duration::seconds(1)).await, 0);
        assert_eq!(store.cleanup_processed_before(now + chrono::Duration::seconds(1)).await, 1);
    }
}
