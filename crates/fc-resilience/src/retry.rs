//! Retry policies (C3).
//!
//! Grounded on the exponential backoff math in the OpenTelemetry Arrow
//! collector's `retry_processor` (`initial_delay * multiplier^(attempt-1)`,
//! capped), adapted to the core's [`CoreError`] taxonomy: a policy is
//! consulted only after [`fc_common::CoreError::is_retryable`] says the
//! failure is worth retrying at all, and it never overrides `Cancellation`.

use fc_common::error::CoreError;
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Decides whether and how long to wait before another attempt.
///
/// `attempt` is 1-based and refers to the attempt that just failed: calling
/// `delay_for(1)` returns the wait before attempt 2.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    fn should_retry(&self, attempt: u32, error: &CoreError) -> bool;
    fn delay_for(&self, attempt: u32) -> Duration;
}

fn retryable(error: &CoreError) -> bool {
    error.is_retryable()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _attempt: u32, _error: &CoreError) -> bool {
        false
    }

    fn delay_for(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[derive(Debug, Clone)]
pub struct FixedDelay {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl FixedDelay {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }
}

impl RetryPolicy for FixedDelay {
    fn should_retry(&self, attempt: u32, error: &CoreError) -> bool {
        retryable(error) && attempt < self.max_attempts
    }

    fn delay_for(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

#[derive(Debug, Clone)]
pub struct LinearBackoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub increment: Duration,
}

impl LinearBackoff {
    pub fn new(max_attempts: u32, base_delay: Duration, increment: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            increment,
        }
    }
}

impl RetryPolicy for LinearBackoff {
    fn should_retry(&self, attempt: u32, error: &CoreError) -> bool {
        retryable(error) && attempt < self.max_attempts
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay + self.increment * attempt.saturating_sub(1)
    }
}

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
            max_delay,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, attempt: u32, error: &CoreError) -> bool {
        retryable(error) && attempt < self.max_attempts
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);
        let final_ms = if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
            capped_ms * jitter_factor
        } else {
            capped_ms
        };
        Duration::from_millis(final_ms.max(0.0) as u64)
    }
}

/// Delegates the retry decision to an inner policy but additionally checks
/// with the caller-supplied predicate (normally a circuit breaker's
/// `allow_request`) before agreeing to retry; when the predicate says the
/// downstream is unavailable, retrying is pointless until it recovers.
pub struct CircuitBreakerRetryPolicy<F> {
    inner: Box<dyn RetryPolicy>,
    allow_request: F,
}

impl<F> fmt::Debug for CircuitBreakerRetryPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRetryPolicy")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<F> CircuitBreakerRetryPolicy<F>
where
    F: Fn() -> bool + Send + Sync,
{
    pub fn new(inner: Box<dyn RetryPolicy>, allow_request: F) -> Self {
        Self {
            inner,
            allow_request,
        }
    }
}

impl<F> RetryPolicy for CircuitBreakerRetryPolicy<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_retry(&self, attempt: u32, error: &CoreError) -> bool {
        if matches!(error, CoreError::CircuitOpen { .. }) {
            return false;
        }
        (self.allow_request)() && self.inner.should_retry(attempt, error)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.inner.delay_for(attempt)
    }
}
