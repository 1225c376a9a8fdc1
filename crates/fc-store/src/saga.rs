//! Saga instance type and repository interface (§3, §4.5).
//!
//! The repository is the sole enforcer of optimistic concurrency (§9): it
//! is the only place a `version` mismatch is detected and turned into
//! [`fc_common::error::CoreError::Concurrency`]. `fc-saga`'s orchestrator
//! never compares versions itself, it just retries on that error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fc_common::error::CoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    pub correlation_id: Uuid,
    pub saga_type: String,
    pub state_name: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_completed: bool,
    pub data: serde_json::Value,
}

impl SagaInstance {
    pub fn new(correlation_id: Uuid, saga_type: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            correlation_id,
            saga_type: saga_type.into(),
            state_name: "Initial".to_string(),
            version: 0,
            created_at: now,
            updated_at: now,
            is_completed: false,
            data: serde_json::Value::Null,
        }
    }

    /// Returns a copy advanced to `version + 1`, ready to hand to
    /// [`SagaRepository::update`]. Does not mutate `self`: callers keep the
    /// observed instance around in case the CAS fails and they need to
    /// retry against a freshly-reloaded one.
    pub fn next_version(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.updated_at = now;
        next
    }
}

#[async_trait]
pub trait SagaRepository: Send + Sync {
    async fn find(&self, correlation_id: &Uuid) -> Option<SagaInstance>;

    /// Fails with [`CoreError::Concurrency`] if `correlation_id` is
    /// already taken (it is an immutable, unique key per §3).
    async fn add(&self, saga: SagaInstance) -> Result<SagaInstance, CoreError>;

    /// CAS on `version`: succeeds only if the stored version equals
    /// `updated.version - 1`. On success the stored row becomes `updated`.
    async fn update(&self, updated: SagaInstance) -> Result<SagaInstance, CoreError>;

    async fn find_by_state(&self, saga_type: &str, state_name: &str) -> Vec<SagaInstance>;

    /// Incomplete sagas whose `updated_at` is strictly before `older_than`.
    async fn find_stale(&self, older_than: DateTime<Utc>) -> Vec<SagaInstance>;
}

#[derive(Default)]
pub struct InMemorySagaRepository {
    sagas: Arc<Mutex<HashMap<Uuid, SagaInstance>>>,
}

impl InMemorySagaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaRepository for InMemorySagaRepository {
    async fn find(&self, correlation_id: &Uuid) -> Option<SagaInstance> {
        self.sagas.lock().get(correlation_id).cloned()
    }

    async fn add(&self, saga: SagaInstance) -> Result<SagaInstance, CoreError> {
        use std::collections::hash_map::Entry;
        let mut guard = self.sagas.lock();
        match guard.entry(saga.correlation_id) {
            Entry::Occupied(_) => Err(CoreError::Concurrency {
                message: format!("saga {} already exists", saga.correlation_id),
            }),
            Entry::Vacant(slot) => {
                slot.insert(saga.clone());
                Ok(saga)
            }
        }
    }

    async fn update(&self, updated: SagaInstance) -> Result<SagaInstance, CoreError> {
        let mut guard = self.sagas.lock();
        match guard.get(&updated.correlation_id) {
            None => Err(CoreError::Concurrency {
                message: format!("saga {} not found", updated.correlation_id),
            }),
            Some(existing) if existing.version != updated.version - 1 => {
                Err(CoreError::Concurrency {
                    message: format!(
                        "expected version {} but stored version is {}",
                        updated.version - 1,
                        existing.version
                    ),
                })
            }
            Some(_) => {
                guard.insert(updated.correlation_id, updated.clone());
                Ok(updated)
            }
        }
    }

    async fn find_by_state(&self, saga_type: &str, state_name: &str) -> Vec<SagaInstance> {
        self.sagas
            .lock()
            .values()
            .filter(|s| s.saga_type == saga_type && s.state_name == state_name)
            .cloned()
            .collect()
    }

    async fn find_stale(&self, older_than: DateTime<Utc>) -> Vec<SagaInstance> {
        self.sagas
            .lock()
            .values()
            .filter(|s| !s.is_completed && s.updated_at < older_than)
            .cloned()
            .collect()
    }
}
