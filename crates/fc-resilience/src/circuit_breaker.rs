//! Circuit breaker (C3).
//!
//! A `RwLock`-guarded sliding window of recent outcomes per key, promoted
//! to a registry so every distinct downstream (fingerprint) gets its own
//! breaker, in the shape of a per-endpoint `CircuitBreakerRegistry`/
//! `EndpointCircuitBreaker` pair. Two differences from that fixed-count
//! shape: the window is evaluated as a failure *rate* against a
//! minimum-throughput floor rather than a raw failure count, and
//! `Instant::now()` is replaced by the injected [`fc_common::Clock`] so
//! reset-timeout behavior is testable without sleeping.

use fc_common::clock::Clock;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate (0.0-1.0) over the window that trips the breaker.
    pub failure_rate_threshold: f64,
    /// Minimum number of requests in the window before the rate is evaluated;
    /// below this, a handful of failures can't trip the breaker.
    pub minimum_throughput: usize,
    /// Size of the sliding outcome window.
    pub window_size: usize,
    /// How long an open breaker waits before allowing a half-open trial.
    pub reset_timeout: Duration,
    /// Concurrent trial requests allowed while half-open.
    pub half_open_max_trials: u64,
    /// Consecutive half-open successes required before closing.
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            minimum_throughput: 10,
            window_size: 20,
            reset_timeout: Duration::from_secs(30),
            half_open_max_trials: 1,
            success_threshold: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub window_failure_rate: f64,
}

struct Inner {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<CircuitState>,
    recent_results: RwLock<VecDeque<bool>>,
    opened_at: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
    half_open_trials_in_flight: AtomicU64,
    half_open_successes: AtomicU64,
    total_requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
}

/// A single endpoint's breaker. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &*self.inner.state.read())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: RwLock::new(CircuitState::Closed),
                recent_results: RwLock::new(VecDeque::new()),
                opened_at: RwLock::new(None),
                half_open_trials_in_flight: AtomicU64::new(0),
                half_open_successes: AtomicU64::new(0),
                total_requests: AtomicU64::new(0),
                total_successes: AtomicU64::new(0),
                total_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.inner.state.read()
    }

    /// Whether a caller may attempt a request right now. `Open` breakers
    /// transition themselves to `HalfOpen` here once the reset timeout has
    /// elapsed, so callers only need to call this once per attempt.
    pub fn allow_request(&self) -> bool {
        let current = self.state();
        match current {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed_enough = self
                    .inner
                    .opened_at
                    .read()
                    .map(|opened| self.inner.clock.now() - opened >= chrono::Duration::from_std(self.inner.config.reset_timeout).unwrap_or_default())
                    .unwrap_or(true);
                if elapsed_enough {
                    let mut state = self.inner.state.write();
                    if *state == CircuitState::Open {
                        *state = CircuitState::HalfOpen;
                        self.inner.half_open_trials_in_flight.store(0, Ordering::SeqCst);
                        self.inner.half_open_successes.store(0, Ordering::SeqCst);
                    }
                    drop(state);
                    self.try_reserve_half_open_trial()
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => self.try_reserve_half_open_trial(),
        }
    }

    fn try_reserve_half_open_trial(&self) -> bool {
        let reserved = self
            .inner
            .half_open_trials_in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n < self.inner.config.half_open_max_trials {
                    Some(n + 1)
                } else {
                    None
                }
            });
        reserved.is_ok()
    }

    pub fn record_success(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
        self.inner.total_successes.fetch_add(1, Ordering::Relaxed);
        self.push_result(true);

        let mut state = self.inner.state.write();
        if *state == CircuitState::HalfOpen {
            let successes = self.inner.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes as usize >= self.inner.config.success_threshold {
                *state = CircuitState::Closed;
                drop(state);
                self.inner.recent_results.write().clear();
                *self.inner.opened_at.write() = None;
                self.inner.half_open_successes.store(0, Ordering::SeqCst);
            }
        }
    }

    pub fn record_failure(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
        self.inner.total_failures.fetch_add(1, Ordering::Relaxed);
        self.push_result(false);

        let mut state = self.inner.state.write();
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.inner.opened_at.write() = Some(self.inner.clock.now());
                self.inner.half_open_successes.store(0, Ordering::SeqCst);
            }
            CircuitState::Closed => {
                if self.window_trips_threshold() {
                    *state = CircuitState::Open;
                    *self.inner.opened_at.write() = Some(self.inner.clock.now());
                }
            }
            CircuitState::Open => {}
        }
    }

    fn push_result(&self, success: bool) {
        let mut buf = self.inner.recent_results.write();
        buf.push_back(success);
        while buf.len() > self.inner.config.window_size {
            buf.pop_front();
        }
    }

    fn window_trips_threshold(&self) -> bool {
        let buf = self.inner.recent_results.read();
        if buf.len() < self.inner.config.minimum_throughput {
            return false;
        }
        let failures = buf.iter().filter(|&&ok| !ok).count();
        let rate = failures as f64 / buf.len() as f64;
        rate >= self.inner.config.failure_rate_threshold
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let buf = self.inner.recent_results.read();
        let window_failure_rate = if buf.is_empty() {
            0.0
        } else {
            buf.iter().filter(|&&ok| !ok).count() as f64 / buf.len() as f64
        };
        CircuitBreakerStats {
            state: self.state(),
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            total_successes: self.inner.total_successes.load(Ordering::Relaxed),
            total_failures: self.inner.total_failures.load(Ordering::Relaxed),
            window_failure_rate,
        }
    }

    pub fn reset(&self) {
        *self.inner.state.write() = CircuitState::Closed;
        self.inner.recent_results.write().clear();
        *self.inner.opened_at.write() = None;
        self.inner.half_open_trials_in_flight.store(0, Ordering::SeqCst);
        self.inner.half_open_successes.store(0, Ordering::SeqCst);
    }
}

/// Owns one [`CircuitBreaker`] per key (typically an endpoint or handler
/// fingerprint), creating it lazily on first use.
pub struct CircuitBreakerRegistry<K> {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: RwLock<HashMap<K, CircuitBreaker>>,
}

impl<K> CircuitBreakerRegistry<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, key: &K) -> CircuitBreaker {
        if let Some(existing) = self.breakers.read().get(key) {
            return existing.clone();
        }
        let mut guard = self.breakers.write();
        match guard.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(slot) => {
                let breaker = CircuitBreaker::new(self.config.clone(), self.clock.clone());
                slot.insert(breaker.clone());
                breaker
            }
        }
    }

    pub fn allow_request(&self, key: &K) -> bool {
        self.get_or_create(key).allow_request()
    }

    pub fn record_success(&self, key: &K) {
        self.get_or_create(key).record_success();
    }

    pub fn record_failure(&self, key: &K) {
        self.get_or_create(key).record_failure();
    }

    pub fn stats(&self, key: &K) -> Option<CircuitBreakerStats> {
        self.breakers.read().get(key).map(CircuitBreaker::stats)
    }

    pub fn all_stats(&self) -> HashMap<K, CircuitBreakerStats>
    where
        K: Hash + Eq,
    {
        self.breakers
            .read()
            .iter()
            .map(|(k, b)| (k.clone(), b.stats()))
            .collect()
    }

    pub fn reset(&self, key: &K) {
        if let Some(breaker) = self.breakers.read().get(key) {
            breaker.reset();
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.reset();
        }
    }

    pub fn open_count(&self) -> usize {
        self.breakers
            .read()
            .values()
            .filter(|b| b.state() == CircuitState::Open)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_common::clock::FakeClock;

    fn breaker() -> (CircuitBreaker, FakeClock) {
        let clock = FakeClock::at_epoch();
        let config = CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            minimum_throughput: 4,
            window_size: 4,
            reset_timeout: Duration::from_secs(10),
            half_open_max_trials: 1,
            success_threshold: 3,
        };
        let cb = CircuitBreaker::new(config, Arc::new(clock.clone()));
        (cb, clock)
    }

    #[test]
    fn stays_closed_below_minimum_throughput() {
        let (cb, _clock) = breaker();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn trips_open_once_failure_rate_and_throughput_are_met() {
        let (cb, _clock) = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn half_opens_after_reset_timeout_and_closes_on_success() {
        let (cb, clock) = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(chrono::Duration::seconds(11));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen, "one success is below the default threshold of 3");
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen, "two successes are still below the threshold");
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let (cb, clock) = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        clock.advance(chrono::Duration::seconds(11));
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn registry_creates_independent_breakers_per_key() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_epoch());
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), clock);
        let a = "endpoint-a".to_string();
        let b = "endpoint-b".to_string();
        for _ in 0..20 {
            registry.record_failure(&a);
        }
        assert_eq!(registry.stats(&a).unwrap().state, CircuitState::Open);
        assert!(registry.stats(&b).is_none());
        assert_eq!(registry.open_count(), 1);
    }
}
