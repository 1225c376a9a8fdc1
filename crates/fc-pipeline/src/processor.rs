//! The core processing abstraction (C4).
//!
//! Every stage of the pipeline — the decorators and the handler at the
//! center — implements this one trait, the same shape a `Mediator` trait
//! uses for HTTP dispatch: a single async entry point over an opaque
//! payload, with everything else (retries, circuit breaking, validation)
//! applied by wrapping one implementation in another rather than
//! branching inside it.

use async_trait::async_trait;
use fc_common::message::Envelope;
use fc_common::processing::{ProcessingContext, ProcessingResult};
use std::sync::Arc;

/// The payload type flowing through the pipeline. Handlers deserialize it
/// into their own concrete type; the pipeline itself never needs to know
/// what's inside.
pub type Payload = serde_json::Value;

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        envelope: Envelope<Payload>,
        ctx: ProcessingContext,
    ) -> ProcessingResult<Payload>;
}

#[async_trait]
impl<T: Processor + ?Sized> Processor for Arc<T> {
    async fn process(
        &self,
        envelope: Envelope<Payload>,
        ctx: ProcessingContext,
    ) -> ProcessingResult<Payload> {
        (**self).process(envelope, ctx).await
    }
}

/// Validates an envelope before it reaches the handler. Implementors
/// return `Err` with a human-readable reason; the Validation decorator
/// turns that into a `CoreError::Validation`.
pub trait Validator: Send + Sync {
    fn validate(&self, envelope: &Envelope<Payload>) -> Result<(), String>;
}

/// A validator that accepts everything; the default when no validation
/// rules are configured.
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _envelope: &Envelope<Payload>) -> Result<(), String> {
        Ok(())
    }
}
