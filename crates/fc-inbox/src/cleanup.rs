//! Retention cleanup for processed inbox entries (§4.3).
//!
//! `Pending`, `Failed`, and `Duplicate` entries are retained for
//! investigation; only `Processed` entries age out.

use fc_common::cancellation::CancellationToken;
use fc_common::clock::Clock;
use fc_store::InboxStore;
use std::sync::Arc;
use std::time::Duration;

pub struct InboxCleanup {
    store: Arc<dyn InboxStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: Duration,
}

impl InboxCleanup {
    pub fn new(store: Arc<dyn InboxStore>, clock: Arc<dyn Clock>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            clock,
            retention,
            interval,
        }
    }

    pub async fn sweep_once(&self) -> usize {
        let cutoff = self.clock.now() - chrono::Duration::from_std(self.retention).unwrap_or_default();
        self.store.cleanup_processed_before(cutoff).await
    }

    pub async fn run(&self, cancellation: CancellationToken) {
        loop {
            if cancellation.is_cancelled() {
                return;
            }
            self.sweep_once().await;
            if cancellation.sleep_or_cancelled(self.interval).await {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_common::clock::FakeClock;
    use fc_common::message::Envelope;
    use fc_store::{InMemoryInboxStore, InboxEntry, InboxOptions};

    #[tokio::test]
    async fn sweep_only_removes_processed_entries_past_retention() {
        let store = Arc::new(InMemoryInboxStore::new());
        let clock = Arc::new(FakeClock::at_epoch());
        let now = clock.now();
        let entry = InboxEntry::pending(
            Envelope::command(serde_json::json!({}), now),
            InboxOptions::default(),
            now,
        );
        let id = entry.id;
        store.try_insert_pending(entry).await;
        store.mark_processed(&id, now).await;

        let cleanup = InboxCleanup::new(store.clone(), clock.clone(), Duration::from_secs(60), Duration::from_secs(5));
        assert_eq!(cleanup.sweep_once().await, 0);
        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(cleanup.sweep_once().await, 1);
    }
}
