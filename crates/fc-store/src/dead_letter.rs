//! Dead-letter store.
//!
//! The error-handling decorator (§4.1 step 5) routes fatal failures here
//! instead of letting them vanish with the failed `ProcessingResult`. Kept
//! deliberately simple: a flat, queryable log, not a retry queue — nothing
//! in this workspace resubmits from the dead letter automatically, per the
//! outbox's own "fatal: never, a poisonous payload stays Failed until
//! inspected" policy (§4.2), which the dead letter mirrors for pipeline
//! failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fc_common::message::Envelope;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub type Payload = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub message: Envelope<Payload>,
    pub error_code: String,
    pub reason: String,
    pub source_component: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn add(&self, entry: DeadLetterEntry);
    async fn get(&self, id: &Uuid) -> Option<DeadLetterEntry>;
    async fn list(&self, limit: usize) -> Vec<DeadLetterEntry>;
    async fn remove(&self, id: &Uuid) -> bool;
    async fn count(&self) -> usize;
    async fn clear(&self);
}

#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    entries: Arc<Mutex<HashMap<Uuid, DeadLetterEntry>>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn add(&self, entry: DeadLetterEntry) {
        self.entries.lock().insert(entry.id, entry);
    }

    async fn get(&self, id: &Uuid) -> Option<DeadLetterEntry> {
        self.entries.lock().get(id).cloned()
    }

    async fn list(&self, limit: usize) -> Vec<DeadLetterEntry> {
        let mut entries: Vec<DeadLetterEntry> = self.entries.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.recorded_at);
        entries.truncate(limit);
        entries
    }

    async fn remove(&self, id: &Uuid) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    async fn count(&self) -> usize {
        self.entries.lock().len()
    }

    async fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_list_returns_in_recorded_order() {
        let store = InMemoryDeadLetterStore::new();
        let now = Utc::now();
        for i in 0..3 {
            store
                .add(DeadLetterEntry {
                    id: Uuid::new_v4(),
                    message: Envelope::command(serde_json::json!(i), now),
                    error_code: "HANDLER_ERROR".into(),
                    reason: "boom".into(),
                    source_component: "error-handling".into(),
                    recorded_at: now + chrono::Duration::seconds(i),
                })
                .await;
        }
        assert_eq!(store.count().await, 3);
        assert_eq!(store.list(2).await.len(), 2);
    }
}
