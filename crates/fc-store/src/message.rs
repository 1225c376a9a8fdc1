//! Generic message store (§6 "Message store").
//!
//! Backs ad-hoc persistence needs (saga snapshots, staged payloads) that
//! don't fit the outbox/inbox/saga-specific shapes. TTL expiry is
//! evaluated lazily on read rather than by running a background sweep
//! for every cache, the same way the other in-memory stores in this
//! workspace avoid a dedicated expiry task.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fc_common::message::Envelope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub type Payload = serde_json::Value;

/// Which timestamp a query orders by: the envelope's own `timestamp`, or
/// the moment it was written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    TimestampAsc,
    TimestampDesc,
    StoredAtAsc,
    StoredAtDesc,
}

/// `query`'s filter fields, per §6.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub collection: Option<String>,
    pub from_ts: Option<DateTime<Utc>>,
    pub to_ts: Option<DateTime<Utc>>,
    pub metadata_equals: HashMap<String, serde_json::Value>,
    pub order_by: Option<SortOrder>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
struct Record {
    envelope: Envelope<Payload>,
    collection: Option<String>,
    stored_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

fn record_matches(record: &Record, filter: &QueryFilter) -> bool {
    if let Some(collection) = &filter.collection {
        if record.collection.as_deref() != Some(collection.as_str()) {
            return false;
        }
    }
    if let Some(from) = filter.from_ts {
        if record.envelope.timestamp < from {
            return false;
        }
    }
    if let Some(to) = filter.to_ts {
        if record.envelope.timestamp > to {
            return false;
        }
    }
    for (key, expected) in &filter.metadata_equals {
        if record.envelope.metadata.get(key) != Some(expected) {
            return false;
        }
    }
    true
}

/// A pending unit of work against a [`MessageStore`]. Writes are staged and
/// only become visible on [`Transaction::commit`]; dropping the guard
/// without committing rolls the staged writes back, matching the "scoped
/// acquisition (guaranteed release on all exit paths)" contract of §6.
pub struct Transaction {
    store: Arc<Mutex<HashMap<String, Record>>>,
    staged: Mutex<HashMap<String, Option<Record>>>,
    resolved: AtomicBool,
}

impl Transaction {
    fn new(store: Arc<Mutex<HashMap<String, Record>>>) -> Self {
        Self {
            store,
            staged: Mutex::new(HashMap::new()),
            resolved: AtomicBool::new(false),
        }
    }

    pub fn store(&self, id: impl Into<String>, envelope: Envelope<Payload>, collection: Option<String>, now: DateTime<Utc>) {
        let record = Record {
            envelope,
            collection,
            stored_at: now,
            expires_at: None,
        };
        self.staged.lock().insert(id.into(), Some(record));
    }

    pub fn delete(&self, id: impl Into<String>) {
        self.staged.lock().insert(id.into(), None);
    }

    pub fn commit(self) {
        let mut guard = self.store.lock();
        for (id, record) in self.staged.lock().drain() {
            match record {
                Some(record) => {
                    guard.insert(id, record);
                }
                None => {
                    guard.remove(&id);
                }
            }
        }
        self.resolved.store(true, Ordering::SeqCst);
    }

    pub fn rollback(self) {
        self.resolved.store(true, Ordering::SeqCst);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.resolved.load(Ordering::SeqCst) {
            tracing::debug!("message store transaction dropped without commit; rolling back");
        }
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn store(
        &self,
        id: Option<String>,
        envelope: Envelope<Payload>,
        collection: Option<String>,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> String;

    /// `None` both when the id is unknown and when a TTL-bearing entry has
    /// expired; callers cannot distinguish the two, matching §6.
    async fn retrieve(&self, id: &str, now: DateTime<Utc>) -> Option<Envelope<Payload>>;

    async fn query(&self, filter: QueryFilter, now: DateTime<Utc>) -> Vec<Envelope<Payload>>;
    async fn delete(&self, id: &str) -> bool;
    async fn update(&self, id: &str, envelope: Envelope<Payload>) -> bool;
    async fn exists(&self, id: &str, now: DateTime<Utc>) -> bool;
    async fn count(&self, filter: Option<QueryFilter>, now: DateTime<Utc>) -> usize;
    async fn clear(&self);
    async fn begin_transaction(&self) -> Transaction;
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: Arc<Mutex<HashMap<String, Record>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(record: &Record, now: DateTime<Utc>) -> bool {
        record.expires_at.map(|exp| exp > now).unwrap_or(true)
    }

    fn prune_expired(&self, now: DateTime<Utc>) {
        self.inner.lock().retain(|_, record| Self::live(record, now));
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn store(
        &self,
        id: Option<String>,
        envelope: Envelope<Payload>,
        collection: Option<String>,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> String {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = Record {
            envelope,
            collection,
            stored_at: now,
            expires_at: ttl.map(|d| now + d),
        };
        self.inner.lock().insert(id.clone(), record);
        id
    }

    async fn retrieve(&self, id: &str, now: DateTime<Utc>) -> Option<Envelope<Payload>> {
        let guard = self.inner.lock();
        guard
            .get(id)
            .filter(|record| Self::live(record, now))
            .map(|record| record.envelope.clone())
    }

    async fn query(&self, filter: QueryFilter, now: DateTime<Utc>) -> Vec<Envelope<Payload>> {
        self.prune_expired(now);
        let guard = self.inner.lock();
        let mut matching: Vec<&Record> = guard.values().filter(|r| record_matches(r, &filter)).collect();

        match filter.order_by {
            Some(SortOrder::TimestampAsc) => matching.sort_by_key(|r| r.envelope.timestamp),
            Some(SortOrder::TimestampDesc) => {
                matching.sort_by_key(|r| std::cmp::Reverse(r.envelope.timestamp))
            }
            Some(SortOrder::StoredAtAsc) => matching.sort_by_key(|r| r.stored_at),
            Some(SortOrder::StoredAtDesc) => matching.sort_by_key(|r| std::cmp::Reverse(r.stored_at)),
            None => {}
        }

        let offset = filter.offset.unwrap_or(0);
        let iter = matching.into_iter().skip(offset);
        match filter.limit {
            Some(limit) => iter.take(limit).map(|r| r.envelope.clone()).collect(),
            None => iter.map(|r| r.envelope.clone()).collect(),
        }
    }

    async fn delete(&self, id: &str) -> bool {
        self.inner.lock().remove(id).is_some()
    }

    async fn update(&self, id: &str, envelope: Envelope<Payload>) -> bool {
        let mut guard = self.inner.lock();
        match guard.get_mut(id) {
            Some(record) => {
                record.envelope = envelope;
                true
            }
            None => false,
        }
    }

    async fn exists(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.retrieve(id, now).await.is_some()
    }

    async fn count(&self, filter: Option<QueryFilter>, now: DateTime<Utc>) -> usize {
        self.prune_expired(now);
        match filter {
            Some(filter) => self
                .inner
                .lock()
                .values()
                .filter(|r| record_matches(r, &filter))
                .count(),
            None => self.inner.lock().len(),
        }
    }

    async fn clear(&self) {
        self.inner.lock().clear();
    }

    async fn begin_transaction(&self) -> Transaction {
        Transaction::new(self.inner.clone())
    }
}

pub type StoredAt = DateTime<Utc>;

#[cfg(test)]
mod tests {
    use super::*;
    use fc_common::message::Envelope;

    fn envelope() -> Envelope<Payload> {
        Envelope::command(serde_json::json!({"x": 1}), Utc::now())
    }

    #[tokio::test]
    async fn ttl_expired_entries_vanish_on_read() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        let id = store
            .store(None, envelope(), None, Some(Duration::milliseconds(-1)), now)
            .await;
        assert!(store.retrieve(&id, now).await.is_none());
        assert!(!store.exists(&id, now).await);
    }

    #[tokio::test]
    async fn transaction_rollback_leaves_no_trace() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        let tx = store.begin_transaction().await;
        tx.store("a", envelope(), None, now);
        tx.rollback();
        assert!(store.retrieve("a", now).await.is_none());
    }

    #[tokio::test]
    async fn transaction_commit_applies_staged_writes_atomically() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        let tx = store.begin_transaction().await;
        tx.store("a", envelope(), Some("orders".into()), now);
        tx.store("b", envelope(), Some("orders".into()), now);
        tx.commit();
        assert!(store.retrieve("a", now).await.is_some());
        assert!(store.retrieve("b", now).await.is_some());
        assert_eq!(store.count(None, now).await, 2);
    }

    #[tokio::test]
    async fn query_filters_by_collection_and_orders() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        store.store(Some("1".into()), envelope(), Some("a".into()), None, now).await;
        store.store(Some("2".into()), envelope(), Some("b".into()), None, now).await;
        let results = store
            .query(
                QueryFilter {
                    collection: Some("a".into()),
                    ..Default::default()
                },
                now,
            )
            .await;
        assert_eq!(results.len(), 1);
    }
}
