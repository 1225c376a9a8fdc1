//! Retention cleanup for processed outbox entries (§4.2).
//!
//! `Failed` entries are deliberately untouched here — they stay until an
//! operator inspects them, per §4.2's "fatal: never" failure semantics.

use fc_common::cancellation::CancellationToken;
use fc_common::clock::Clock;
use fc_store::OutboxStore;
use std::sync::Arc;
use std::time::Duration;

pub struct OutboxCleanup {
    store: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: Duration,
}

impl OutboxCleanup {
    pub fn new(store: Arc<dyn OutboxStore>, clock: Arc<dyn Clock>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            clock,
            retention,
            interval,
        }
    }

    pub async fn sweep_once(&self) -> usize {
        let cutoff = self.clock.now() - chrono::Duration::from_std(self.retention).unwrap_or_default();
        let removed = self.store.cleanup_processed_before(cutoff).await;
        if removed > 0 {
            tracing::debug!(removed, "swept processed outbox entries past retention");
        }
        removed
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
