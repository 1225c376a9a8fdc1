//! The decorator chain (C4).
//!
//! Each decorator wraps an inner [`Processor`] and adds exactly one
//! concern, the same shape an `HttpMediator` uses to wrap a retry loop
//! around a circuit-breaker-gated HTTP call. [`PipelineBuilder`] composes
//! them in a fixed order:
//!
//! ```text
//! Metrics -> Logging -> Correlation -> Validation -> ErrorHandling -> Retry -> CircuitBreaker -> core
//! ```
//!
//! Build from the inside out: wrap the core processor with
//! `with_circuit_breaker`, then `with_retry`, then `with_error_handling`,
//! and so on, finishing with `with_metrics` last so it ends up outermost.

use crate::processor::{Payload, Processor, Validator};
use crate::telemetry::TelemetrySink;
use async_trait::async_trait;
use fc_common::error::CoreError;
use fc_common::message::Envelope;
use fc_common::processing::{ProcessingContext, ProcessingResult};
use fc_resilience::circuit_breaker::CircuitBreakerRegistry;
use fc_resilience::retry::RetryPolicy;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsDecorator {
    inner: Arc<dyn Processor>,
    sink: Arc<dyn TelemetrySink>,
    handler_name: String,
}

impl MetricsDecorator {
    pub fn new(inner: Arc<dyn Processor>, sink: Arc<dyn TelemetrySink>, handler_name: impl Into<String>) -> Self {
        Self {
            inner,
            sink,
            handler_name: handler_name.into(),
        }
    }
}

#[async_trait]
impl Processor for MetricsDecorator {
    async fn process(&self, envelope: Envelope<Payload>, ctx: ProcessingContext) -> ProcessingResult<Payload> {
        self.sink.record_attempt(&self.handler_name, ctx.attempt);
        let start = Instant::now();
        let result = self.inner.process(envelope, ctx).await;
        let elapsed = start.elapsed();
        match &result {
            ProcessingResult::Success(_) => self.sink.record_success(&self.handler_name, elapsed),
            ProcessingResult::Failure(err) => {
                self.sink.record_failure(&self.handler_name, err.error_code(), elapsed)
            }
            ProcessingResult::Cancelled => self.sink.record_cancelled(&self.handler_name, elapsed),
        }
        result
    }
}

pub struct LoggingDecorator {
    inner: Arc<dyn Processor>,
    handler_name: String,
}

impl LoggingDecorator {
    pub fn new(inner: Arc<dyn Processor>, handler_name: impl Into<String>) -> Self {
        Self {
            inner,
            handler_name: handler_name.into(),
        }
    }
}

#[async_trait]
impl Processor for LoggingDecorator {
    async fn process(&self, envelope: Envelope<Payload>, ctx: ProcessingContext) -> ProcessingResult<Payload> {
        let message_id = envelope.message_id;
        tracing::debug!(handler = %self.handler_name, %message_id, attempt = ctx.attempt, "dispatching");
        let result = self.inner.process(envelope, ctx).await;
        match &result {
            ProcessingResult::Success(_) => {
                tracing::debug!(handler = %self.handler_name, %message_id, "dispatch succeeded")
            }
            ProcessingResult::Failure(err) => {
                tracing::warn!(handler = %self.handler_name, %message_id, error = %err, "dispatch failed")
            }
            ProcessingResult::Cancelled => {
                tracing::debug!(handler = %self.handler_name, %message_id, "dispatch cancelled")
            }
        }
        result
    }
}

/// Assigns correlation/causation ids if the envelope doesn't already carry
/// them. See [`Envelope::ensure_correlation`].
pub struct CorrelationDecorator {
    inner: Arc<dyn Processor>,
}

impl CorrelationDecorator {
    pub fn new(inner: Arc<dyn Processor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Processor for CorrelationDecorator {
    async fn process(&self, mut envelope: Envelope<Payload>, mut ctx: ProcessingContext) -> ProcessingResult<Payload> {
        envelope.ensure_correlation(ctx.causation_id);
        if let Some(correlation_id) = envelope.correlation_id {
            ctx.correlation_id = correlation_id;
        }
        ctx.causation_id = envelope.causation_id;
        self.inner.process(envelope, ctx).await
    }
}

pub struct ValidationDecorator {
    inner: Arc<dyn Processor>,
    validator: Arc<dyn Validator>,
}

impl ValidationDecorator {
    pub fn new(inner: Arc<dyn Processor>, validator: Arc<dyn Validator>) -> Self {
        Self { inner, validator }
    }
}

#[async_trait]
impl Processor for ValidationDecorator {
    async fn process(&self, envelope: Envelope<Payload>, ctx: ProcessingContext) -> ProcessingResult<Payload> {
        if let Err(reason) = self.validator.validate(&envelope) {
            return ProcessingResult::Failure(CoreError::validation(reason));
        }
        self.inner.process(envelope, ctx).await
    }
}

/// Catches panics from everything it wraps and turns them into
/// `CoreError::Handler` failures instead of unwinding the caller's task.
/// This is the boundary where handler bugs stop propagating as crashes.
pub struct ErrorHandlingDecorator {
    inner: Arc<dyn Processor>,
}

impl ErrorHandlingDecorator {
    pub fn new(inner: Arc<dyn Processor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Processor for ErrorHandlingDecorator {
    async fn process(&self, envelope: Envelope<Payload>, ctx: ProcessingContext) -> ProcessingResult<Payload> {
        let fut = AssertUnwindSafe(self.inner.process(envelope, ctx)).catch_unwind();
        match fut.await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                ProcessingResult::Failure(CoreError::handler(message))
            }
        }
    }
}

pub struct RetryDecorator {
    inner: Arc<dyn Processor>,
    policy: Arc<dyn RetryPolicy>,
}

impl RetryDecorator {
    pub fn new(inner: Arc<dyn Processor>, policy: Arc<dyn RetryPolicy>) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Processor for RetryDecorator {
    async fn process(&self, envelope: Envelope<Payload>, ctx: ProcessingContext) -> ProcessingResult<Payload> {
        let mut current_ctx = ctx;
        loop {
            let attempt = current_ctx.attempt;
            let cancellation = current_ctx.cancellation.clone();
            let result = self.inner.process(envelope.clone(), current_ctx.clone()).await;
            let error = match &result {
                ProcessingResult::Failure(err) => err,
                _ => return result,
            };
            if !self.policy.should_retry(attempt, error) {
                return result;
            }
            let delay = self.policy.delay_for(attempt);
            if cancellation.sleep_or_cancelled(delay).await {
                return ProcessingResult::Cancelled;
            }
            current_ctx = current_ctx.next_attempt();
        }
    }
}

/// Fingerprints an (envelope, context) pair into the key the circuit
/// breaker registry groups failures by, typically the handler name or
/// target endpoint.
pub type FingerprintFn = Arc<dyn Fn(&Envelope<Payload>, &ProcessingContext) -> String + Send + Sync>;

pub struct CircuitBreakerDecorator {
    inner: Arc<dyn Processor>,
    registry: Arc<CircuitBreakerRegistry<String>>,
    fingerprint: FingerprintFn,
}

impl CircuitBreakerDecorator {
    pub fn new(
        inner: Arc<dyn Processor>,
        registry: Arc<CircuitBreakerRegistry<String>>,
        fingerprint: FingerprintFn,
    ) -> Self {
        Self {
            inner,
            registry,
            fingerprint,
        }
    }
}

#[async_trait]
impl Processor for CircuitBreakerDecorator {
    async fn process(&self, envelope: Envelope<Payload>, ctx: ProcessingContext) -> ProcessingResult<Payload> {
        let key = (self.fingerprint)(&envelope, &ctx);
        if !self.registry.allow_request(&key) {
            return ProcessingResult::Failure(CoreError::CircuitOpen { fingerprint: key });
        }
        let result = self.inner.process(envelope, ctx).await;
        match &result {
            ProcessingResult::Success(_) => self.registry.record_success(&key),
            ProcessingResult::Failure(_) => self.registry.record_failure(&key),
            ProcessingResult::Cancelled => {}
        }
        result
    }
}

pub struct PipelineBuilder {
    processor: Arc<dyn Processor>,
}

impl PipelineBuilder {
    pub fn new(core: Arc<dyn Processor>) -> Self {
        Self { processor: core }
    }

    pub fn with_circuit_breaker(self, registry: Arc<CircuitBreakerRegistry<String>>, fingerprint: FingerprintFn) -> Self {
        Self {
            processor: Arc::new(CircuitBreakerDecorator::new(self.processor, registry, fingerprint)),
        }
    }

    pub fn with_retry(self, policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            processor: Arc::new(RetryDecorator::new(self.processor, policy)),
        }
    }

    pub fn with_error_handling(self) -> Self {
        Self {
            processor: Arc::new(ErrorHandlingDecorator::new(self.processor)),
        }
    }

    pub fn with_validation(self, validator: Arc<dyn Validator>) -> Self {
        Self {
            processor: Arc::new(ValidationDecorator::new(self.processor, validator)),
        }
    }

    pub fn with_correlation(self) -> Self {
        Self {
            processor: Arc::new(CorrelationDecorator::new(self.processor)),
        }
    }

    pub fn with_logging(self, handler_name: impl Into<String>) -> Self {
        Self {
            processor: Arc::new(LoggingDecorator::new(self.processor, handler_name)),
        }
    }

    pub fn with_metrics(self, sink: Arc<dyn TelemetrySink>, handler_name: impl Into<String>) -> Self {
        Self {
            processor: Arc::new(MetricsDecorator::new(self.processor, sink, handler_name)),
        }
    }

    pub fn build(self) -> Arc<dyn Processor> {
        self.processor
    }
}
