//! At-most-once inbound acceptance (§4.3).
//!
//! `is_duplicate` is a pure read: §8 requires it be idempotent, so
//! nothing here mutates the store just by asking the question. Mutation
//! only happens in [`InboxDeduplicator::accept`], which is the
//! pipeline's "before invoking a handler" hook.

use chrono::{DateTime, Duration, Utc};
use fc_common::clock::Clock;
use fc_common::message::Envelope;
use fc_store::{InboxEntry, InboxOptions, InboxStore};
use std::sync::Arc;
use uuid::Uuid;

pub type Payload = serde_json::Value;

#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    /// A fresh arrival: the caller should invoke the handler, then call
    /// [`InboxDeduplicator::finalize_success`] or
    /// [`InboxDeduplicator::finalize_failure`].
    Accepted(InboxEntry),
    /// Already seen (within the window, or ever, if no window was given);
    /// the caller treats this as a successful no-op.
    Duplicate,
}

pub struct InboxDeduplicator {
    store: Arc<dyn InboxStore>,
    clock: Arc<dyn Clock>,
}

impl InboxDeduplicator {
    pub fn new(store: Arc<dyn InboxStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// `true` iff an entry for `message_id` exists and, when `window` is
    /// given, was received strictly less than `window` ago. Never mutates
    /// the store.
    pub async fn is_duplicate(&self, message_id: &Uuid, window: Option<Duration>) -> bool {
        let Some(existing) = self.store.find(message_id).await else {
            return false;
        };
        match window {
            None => true,
            Some(w) => (self.clock.now() - existing.received_at) < w,
        }
    }

    /// The pipeline's inbound gate: returns [`AcceptOutcome::Duplicate`]
    /// without touching the store, or records a fresh `Pending` entry and
    /// returns [`AcceptOutcome::Accepted`].
    pub async fn accept(
        &self,
        message: Envelope<Payload>,
        options: InboxOptions,
        window: Option<Duration>,
    ) -> AcceptOutcome {
        if !options.require_idempotency {
            let entry = InboxEntry::pending(message, options, self.clock.now());
            self.store.reset_pending(entry.clone()).await;
            return AcceptOutcome::Accepted(entry);
        }

        if self.is_duplicate(&message.message_id, window).await {
            return AcceptOutcome::Duplicate;
        }

        let entry = InboxEntry::pending(message, options, self.clock.now());
        if self.store.try_insert_pending(entry.clone()).await {
            AcceptOutcome::Accepted(entry)
        } else if window.is_some() {
            // Existing entry's window had elapsed per is_duplicate, but a
            // concurrent insert won the race between the check and here.
            self.store.reset_pending(entry.clone()).await;
            AcceptOutcome::Accepted(entry)
        } else {
            AcceptOutcome::Duplicate
        }
    }

    pub async fn finalize_success(&self, id: &Uuid) -> bool {
        self.store.mark_processed(id, self.clock.now()).await
    }

    pub async fn finalize_failure(&self, id: &Uuid, error: impl Into<String>) -> bool {
        self.store.mark_failed(id, error.into()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_common::clock::FakeClock;
    use fc_store::InMemoryInboxStore;

    fn dedup() -> (InboxDeduplicator, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::at_epoch());
        let dedup = InboxDeduplicator::new(Arc::new(InMemoryInboxStore::new()), clock.clone());
        (dedup, clock)
    }

    fn message() -> Envelope<Payload> {
        Envelope::command(serde_json::json!({}), Utc::now())
    }

    #[tokio::test]
    async fn window_boundary_is_not_a_duplicate() {
        let (dedup, clock) = dedup();
        let msg = message();
        let id = msg.message_id;
        dedup
            .accept(msg, InboxOptions { require_idempotency: true }, Some(Duration::seconds(10)))
            .await;

        clock.advance(Duration::milliseconds(9999));
        assert!(dedup.is_duplicate(&id, Some(Duration::seconds(10))).await);

        clock.advance(Duration::milliseconds(1));
        assert!(!dedup.is_duplicate(&id, Some(Duration::seconds(10))).await, "exact boundary must not be duplicate");

        clock.advance(Duration::milliseconds(1));
        assert!(!dedup.is_duplicate(&id, Some(Duration::seconds(10))).await);
    }

    #[tokio::test]
    async fn without_a_window_any_existing_entry_is_a_duplicate() {
        let (dedup, clock) = dedup();
        let msg = message();
        let id = msg.message_id;
        dedup
            .accept(msg, InboxOptions { require_idempotency: true }, None)
            .await;
        clock.advance(Duration::days(365));
        assert!(dedup.is_duplicate(&id, None).await);
    }

    #[tokio::test]
    async fn is_duplicate_does_not_mutate_state() {
        let (dedup, _clock) = dedup();
        let msg = message();
        let id = msg.message_id;
        dedup
            .accept(msg, InboxOptions { require_idempotency: true }, Some(Duration::seconds(5)))
            .await;
        for _ in 0..5 {
            dedup.is_duplicate(&id, Some(Duration::seconds(5))).await;
        }
        // A second accept still sees the same single entry as a duplicate.
        assert!(dedup.is_duplicate(&id, Some(Duration::seconds(5))).await);
    }

    #[tokio::test]
    async fn second_accept_within_window_returns_duplicate_outcome() {
        let (dedup, _clock) = dedup();
        let msg = message();
        let outcome = dedup
            .accept(msg.clone(), InboxOptions { require_idempotency: true }, Some(Duration::seconds(10)))
            .await;
        assert!(matches!(outcome, AcceptOutcome::Accepted(_)));

        let outcome = dedup
            .accept(msg, InboxOptions { require_idempotency: true }, Some(Duration::seconds(10)))
            .await;
        assert!(matches!(outcome, AcceptOutcome::Duplicate));
    }

    #[tokio::test]
    async fn mark_processed_twice_is_a_no_op_after_first() {
        let (dedup, _clock) = dedup();
        let msg = message();
        let id = msg.message_id;
        dedup
            .accept(msg, InboxOptions { require_idempotency: true }, None)
            .await;
        assert!(dedup.finalize_success(&id).await);
        assert!(dedup.finalize_success(&id).await);
    }
}
