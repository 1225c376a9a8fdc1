//! Processing context and outcome (C2 / C4).
//!
//! [`ProcessingContext`] is threaded through every decorator in the
//! pipeline; each decorator reads and sometimes enriches it (the
//! Correlation decorator is the main writer) rather than passing its own
//! side-channel state. [`ProcessingResult`] keeps cancellation as a
//! first-class outcome distinct from failure, per §4.1/§7: a handler that
//! was asked to stop did not err, and folding the two together makes retry
//! policies retry work that was deliberately abandoned.

use crate::cancellation::CancellationToken;
use crate::error::CoreError;
use crate::message::Metadata;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Which dispatch shape a handler was registered for. Mirrors
/// [`crate::message::MessageKind`] but lives on the handler side of the
/// registry rather than the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerType {
    Command,
    Query,
    Event,
}

/// Per-attempt state carried alongside a message as it moves through the
/// pipeline. Cheap to clone: decorators that fan out (event bus, retry)
/// clone the context once per branch rather than sharing a single mutable
/// instance across concurrent attempts.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub message_id: Uuid,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub handler_type: HandlerType,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub cancellation: CancellationToken,
    pub metadata: Metadata,
    attributes: HashMap<String, String>,
}

impl ProcessingContext {
    pub fn new(
        message_id: Uuid,
        correlation_id: Uuid,
        handler_type: HandlerType,
        started_at: DateTime<Utc>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            message_id,
            correlation_id,
            causation_id: None,
            handler_type,
            attempt: 1,
            started_at,
            cancellation,
            metadata: Metadata::new(),
            attributes: HashMap::new(),
        }
    }

    /// Returns a context for the next retry attempt: same identity, attempt
    /// incremented, everything else carried over.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next
    }

    pub fn is_first_attempt(&self) -> bool {
        self.attempt == 1
    }

    /// Free-form string attributes set by decorators (e.g. the endpoint
    /// fingerprint the circuit breaker keys on). Deliberately separate from
    /// envelope [`Metadata`], which belongs to the message, not the attempt.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// The three-way outcome every processor in the pipeline returns.
#[derive(Debug)]
pub enum ProcessingResult<T> {
    Success(T),
    Failure(CoreError),
    Cancelled,
}

impl<T> ProcessingResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(self) -> Option<CoreError> {
        match self {
            Self::Failure(err) => Some(err),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProcessingResult<U> {
        match self {
            Self::Success(value) => ProcessingResult::Success(f(value)),
            Self::Failure(err) => ProcessingResult::Failure(err),
            Self::Cancelled => ProcessingResult::Cancelled,
        }
    }
}

impl<T> From<crate::error::Result<T>> for ProcessingResult<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(CoreError::Cancellation) => Self::Cancelled,
            Err(err) => Self::Failure(err),
        }
    }
}
