//! Visibility-based priority queue (C5 subset, §4.4).
//!
//! `fc-queue` supplies the `QueueStore` trait plus the in-memory reference
//! implementation required by §2. Concrete broker adapters (SQS,
//! ActiveMQ, a SQLite-backed queue) are the excluded concrete transports
//! and are not carried into this workspace — callers bring their own
//! adapter implementing [`QueueStore`].

pub mod error;

pub use error::QueueError;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fc_common::message::Envelope;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub type Payload = serde_json::Value;
pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// A dequeued entry becomes invisible again for this long before it's
    /// eligible for redelivery.
    pub visibility_timeout: std::time::Duration,
    /// Entries at or past this many dequeues are no longer dequeueable
    /// (they've exhausted their delivery attempts).
    pub max_dequeue_count: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: std::time::Duration::from_secs(30),
            max_dequeue_count: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Higher value dequeues first — the opposite convention from the
    /// outbox's priority, which is lower-first. The two are independent
    /// components and this queue keeps its own original higher-first
    /// ordering for dequeue.
    pub priority: i32,
    pub delay: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub message: Envelope<Payload>,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub visible_at: DateTime<Utc>,
    pub dequeue_count: u32,
}

impl QueueEntry {
    pub fn is_dequeueable(&self, now: DateTime<Utc>, max_dequeue_count: u32) -> bool {
        self.visible_at <= now && self.dequeue_count < max_dequeue_count
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn enqueue(&self, message: Envelope<Payload>, options: EnqueueOptions, now: DateTime<Utc>) -> QueueEntry;

    /// Atomically selects the highest-priority, oldest-enqueued dequeueable
    /// entry, bumps its `dequeue_count`, and pushes `visible_at` out by the
    /// configured visibility timeout.
    async fn dequeue(&self, config: QueueConfig, now: DateTime<Utc>) -> Option<QueueEntry>;

    async fn acknowledge(&self, id: &Uuid) -> Result<()>;

    /// `requeue = true` resets the entry to immediately visible with a
    /// fresh delivery count; `requeue = false` drops it permanently.
    async fn reject(&self, id: &Uuid, requeue: bool, now: DateTime<Utc>) -> Result<()>;

    async fn len(&self) -> usize;
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Default)]
pub struct InMemoryQueueStore {
    entries: Arc<Mutex<HashMap<Uuid, QueueEntry>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, message: Envelope<Payload>, options: EnqueueOptions, now: DateTime<Utc>) -> QueueEntry {
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            message,
            priority: options.priority,
            enqueued_at: now,
            visible_at: now + options.delay.unwrap_or(Duration::zero()),
            dequeue_count: 0,
        };
        self.entries.lock().insert(entry.id, entry.clone());
        entry
    }

    async fn dequeue(&self, config: QueueConfig, now: DateTime<Utc>) -> Option<QueueEntry> {
        let mut guard = self.entries.lock();
        let candidate_id = guard
            .values()
            .filter(|e| e.is_dequeueable(now, config.max_dequeue_count))
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.enqueued_at.cmp(&b.enqueued_at))
            })
            .map(|e| e.id)?;

        let entry = guard.get_mut(&candidate_id)?;
        entry.dequeue_count += 1;
        entry.visible_at = now + Duration::from_std(config.visibility_timeout).unwrap_or_default();
        Some(entry.clone())
    }

    async fn acknowledge(&self, id: &Uuid) -> Result<()> {
        self.entries
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    async fn reject(&self, id: &Uuid, requeue: bool, now: DateTime<Utc>) -> Result<()> {
        let mut guard = self.entries.lock();
        if requeue {
            let entry = guard.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
            entry.visible_at = now;
            entry.dequeue_count = 0;
            Ok(())
        } else {
            guard
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| QueueError::NotFound(id.to_string()))
        }
    }

    async fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope<Payload> {
        Envelope::command(serde_json::json!({}), Utc::now())
    }

    #[tokio::test]
    async fn dequeue_orders_by_priority_desc_then_enqueued_at_asc() {
        let store = InMemoryQueueStore::new();
        let now = Utc::now();
        let low = store
            .enqueue(envelope(), EnqueueOptions { priority: 1, delay: None }, now)
            .await;
        let high = store
            .enqueue(
                envelope(),
                EnqueueOptions { priority: 9, delay: None },
                now + Duration::seconds(1),
            )
            .await;

        let dequeued = store.dequeue(QueueConfig::default(), now + Duration::seconds(2)).await.unwrap();
        assert_eq!(dequeued.id, high.id);
        let next = store.dequeue(QueueConfig::default(), now + Duration::seconds(2)).await.unwrap();
        assert_eq!(next.id, low.id);
    }

    #[tokio::test]
    async fn dequeued_entry_is_invisible_until_timeout_elapses() {
        let store = InMemoryQueueStore::new();
        let now = Utc::now();
        store.enqueue(envelope(), EnqueueOptions::default(), now).await;
        let config = QueueConfig {
            visibility_timeout: std::time::Duration::from_secs(10),
            max_dequeue_count: 5,
        };
        let first = store.dequeue(config, now).await;
        assert!(first.is_some());
        assert!(store.dequeue(config, now + Duration::seconds(5)).await.is_none());
        assert!(store.dequeue(config, now + Duration::seconds(11)).await.is_some());
    }

    #[tokio::test]
    async fn exhausted_dequeue_count_excludes_entry() {
        let store = InMemoryQueueStore::new();
        let now = Utc::now();
        store.enqueue(envelope(), EnqueueOptions::default(), now).await;
        let config = QueueConfig {
            visibility_timeout: std::time::Duration::from_secs(0),
            max_dequeue_count: 2,
        };
        assert!(store.dequeue(config, now).await.is_some());
        assert!(store.dequeue(config, now).await.is_some());
        assert!(store.dequeue(config, now).await.is_none());
    }

    #[tokio::test]
    async fn reject_with_requeue_resets_visibility_and_count() {
        let store = InMemoryQueueStore::new();
        let now = Utc::now();
        let entry = store.enqueue(envelope(), EnqueueOptions::default(), now).await;
        let config = QueueConfig {
            visibility_timeout: std::time::Duration::from_secs(30),
            max_dequeue_count: 5,
        };
        store.dequeue(config, now).await;
        store.reject(&entry.id, true, now + Duration::seconds(1)).await.unwrap();
        let redelivered = store.dequeue(config, now + Duration::seconds(1)).await.unwrap();
        assert_eq!(redelivered.dequeue_count, 1);
    }

    #[tokio::test]
    async fn reject_without_requeue_drops_entry() {
        let store = InMemoryQueueStore::new();
        let now = Utc::now();
        let entry = store.enqueue(envelope(), EnqueueOptions::default(), now).await;
        store.reject(&entry.id, false, now).await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn acknowledge_removes_entry() {
        let store = InMemoryQueueStore::new();
        let now = Utc::now();
        let entry = store.enqueue(envelope(), EnqueueOptions::default(), now).await;
        store.dequeue(QueueConfig::default(), now).await;
        store.acknowledge(&entry.id).await.unwrap();
        assert!(store.is_empty().await);
    }
}
