//! Telemetry sink abstraction used by the Metrics decorator.
//!
//! Elsewhere in this style of codebase the equivalent is a thin wrapper
//! around the `metrics` crate's global recorder (`metrics::counter!`/
//! `metrics::gauge!` in a scheduler poller). Here the sink is a trait
//! instead of a bare global so tests can assert on what got recorded
//! without standing up a real metrics backend; [`TracingTelemetrySink`]
//! is the production implementation and simply emits structured
//! `tracing` events, which a
//! collector scrapes the same way it would `metrics` output.

use std::time::Duration;

pub trait TelemetrySink: Send + Sync {
    fn record_attempt(&self, handler: &str, attempt: u32);
    fn record_success(&self, handler: &str, duration: Duration);
    fn record_failure(&self, handler: &str, error_code: &str, duration: Duration);
    fn record_cancelled(&self, handler: &str, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record_attempt(&self, handler: &str, attempt: u32) {
        tracing::debug!(handler, attempt, "processing attempt");
    }

    fn record_success(&self, handler: &str, duration: Duration) {
        tracing::info!(handler, duration_ms = duration.as_millis() as u64, "processing succeeded");
    }

    fn record_failure(&self, handler: &str, error_code: &str, duration: Duration) {
        tracing::warn!(
            handler,
            error_code,
            duration_ms = duration.as_millis() as u64,
            "processing failed"
        );
    }

    fn record_cancelled(&self, handler: &str, duration: Duration) {
        tracing::info!(handler, duration_ms = duration.as_millis() as u64, "processing cancelled");
    }
}
