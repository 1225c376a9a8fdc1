//! Compensation stack (§4.5).
//!
//! Actions register compensations as they run; if the saga later fails,
//! the stack unwinds in reverse registration order. Compensation actions
//! are native trait objects rather than persisted data, so the stack
//! lives only as long as the orchestrator process does — see the note on
//! [`super::orchestrator::SagaOrchestrator`] for what that trades away.

use async_trait::async_trait;
use fc_common::cancellation::CancellationToken;
use fc_common::error::CoreError;
use std::sync::Arc;

#[async_trait]
pub trait CompensationAction: Send + Sync {
    async fn compensate(&self, cancellation: &CancellationToken) -> Result<(), CoreError>;
}

/// A LIFO stack of named compensations plus the one-shot guard that keeps
/// [`CompensationContext::fire_all`] idempotent.
#[derive(Default)]
pub struct CompensationContext {
    stack: Vec<(String, Arc<dyn CompensationAction>)>,
    already_compensated: bool,
}

impl CompensationContext {
    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn CompensationAction>) {
        self.stack.push((name.into(), action));
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn already_compensated(&self) -> bool {
        self.already_compensated
    }

    /// Unwinds the stack in reverse registration order. A second call after
    /// the first completes is a no-op: compensations run exactly once.
    /// Individual failures are logged and do not stop the unwind; if any
    /// occurred, their messages are folded into a single aggregate error.
    pub async fn fire_all(&mut self, cancellation: &CancellationToken) -> Result<(), CoreError> {
        if self.already_compensated {
            return Ok(());
        }
        self.already_compensated = true;

        let mut failures = Vec::new();
        while let Some((name, action)) = self.stack.pop() {
            if let Err(err) = action.compensate(cancellation).await {
                tracing::warn!(compensation = %name, error = %err, "compensation action failed");
                failures.push(format!("{name}: {err}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::handler(format!(
                "{} compensation action(s) failed: {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}
