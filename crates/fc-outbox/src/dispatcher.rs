//! The outbox dispatch loop (C6, §4.2).
//!
//! Built in the shape of `OutboxProcessor::start`: a
//! `tokio::time::sleep`-driven poll loop over a batch of fetched items,
//! generalized from two fixed item types and `mark_*` convenience methods
//! to a single [`fc_store::OutboxEntry`] shape, with retry scheduling and
//! the §4.2 cleanup behavior added.

use crate::transport::TransportSink;
use fc_common::cancellation::CancellationToken;
use fc_common::clock::Clock;
use fc_resilience::retry::RetryPolicy;
use fc_store::{OutboxEntry, OutboxStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped_contended: usize,
}

pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    transport: Arc<dyn TransportSink>,
    backoff: Arc<dyn RetryPolicy>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        transport: Arc<dyn TransportSink>,
        backoff: Arc<dyn RetryPolicy>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            transport,
            backoff,
            clock,
            config,
        }
    }

    /// Runs the poll loop until `cancellation` fires. Each tick calls
    /// [`Self::dispatch_once`]; errors within a tick are logged, never
    /// propagated, so one bad batch doesn't kill the loop.
    pub async fn run(&self, cancellation: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "starting outbox dispatcher"
        );
        loop {
            if cancellation.is_cancelled() {
                return;
            }
            let report = self.dispatch_once().await;
            if report.dispatched + report.retried + report.failed > 0 {
                tracing::debug!(?report, "outbox dispatch tick");
            }
            if cancellation.sleep_or_cancelled(self.config.poll_interval).await {
                return;
            }
        }
    }

    /// Fetches up to `batch_size` dispatchable entries and attempts to
    /// publish each, per §4.2 steps 1-4.
    pub async fn dispatch_once(&self) -> DispatchReport {
        let now = self.clock.now();
        let entries = self.store.fetch_dispatchable(self.config.batch_size, now).await;
        let mut report = DispatchReport::default();

        for entry in entries {
            if !self.store.mark_processing(&entry.id).await {
                report.skipped_contended += 1;
                continue;
            }
            self.attempt_dispatch(entry, &mut report).await;
        }
        report
    }

    async fn attempt_dispatch(&self, entry: OutboxEntry, report: &mut DispatchReport) {
        let cancellation = CancellationToken::new();
        let result = self
            .transport
            .publish(&entry.message, &entry.options.destination, &cancellation)
            .await;

        match result {
            Ok(()) => {
                self.store.mark_processed(&entry.id, self.clock.now()).await;
                report.dispatched += 1;
            }
            Err(err) => {
                let next_retry_count = entry.retry_count + 1;
                if next_retry_count >= entry.options.max_retries {
                    self.store.mark_failed(&entry.id, err.to_string()).await;
                    report.failed += 1;
                } else {
                    let delay = self.backoff.delay_for(next_retry_count);
                    self.store
                        .mark_for_retry(
                            &entry.id,
                            next_retry_count,
                            self.clock.now() + chrono::Duration::from_std(delay).unwrap_or_default(),
                            err.to_string(),
                        )
                        .await;
                    report.retried += 1;
                }
            }
        }
    }
}
