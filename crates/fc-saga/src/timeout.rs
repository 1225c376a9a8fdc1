//! Saga timeout handler (C9, §4.6).
//!
//! Periodically scans for sagas that haven't progressed within their
//! timeout window and feeds each a synthetic `TimeoutElapsed` event, the
//! same poll-and-react shape `fc-outbox::OutboxDispatcher` uses for its
//! own retry sweep.

use crate::orchestrator::SagaOrchestrator;
use fc_common::cancellation::CancellationToken;
use fc_common::clock::Clock;
use fc_common::message::Envelope;
use fc_store::SagaRepository;
use std::sync::Arc;
use std::time::Duration;

pub const TIMEOUT_ELAPSED_EVENT: &str = "TimeoutElapsed";

#[derive(Debug, Clone, Copy)]
pub struct SagaTimeoutConfig {
    pub scan_interval: Duration,
    /// How long a saga may go without an update before it's considered stale.
    pub timeout: Duration,
}

impl Default for SagaTimeoutConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(300),
        }
    }
}

pub struct SagaTimeoutHandler {
    orchestrator: Arc<SagaOrchestrator>,
    repository: Arc<dyn SagaRepository>,
    clock: Arc<dyn Clock>,
    config: SagaTimeoutConfig,
}

impl SagaTimeoutHandler {
    pub fn new(
        orchestrator: Arc<SagaOrchestrator>,
        repository: Arc<dyn SagaRepository>,
        clock: Arc<dyn Clock>,
        config: SagaTimeoutConfig,
    ) -> Self {
        Self { orchestrator, repository, clock, config }
    }

    pub async fn run(&self, cancellation: CancellationToken) {
        loop {
            if cancellation.is_cancelled() {
                return;
            }
            self.scan_once(&cancellation).await;
            if cancellation.sleep_or_cancelled(self.config.scan_interval).await {
                return;
            }
        }
    }

    /// Returns the number of stale sagas a `TimeoutElapsed` event was
    /// dispatched to.
    pub async fn scan_once(&self, cancellation: &CancellationToken) -> usize {
        let older_than = self.clock.now() - chrono::Duration::from_std(self.config.timeout).unwrap_or_default();
        let stale = self.repository.find_stale(older_than).await;
        let mut dispatched = 0;
        for saga in stale {
            let event = Envelope::event(serde_json::json!({ "reason": "timeout" }), self.clock.now())
                .with_correlation_id(saga.correlation_id);
            let outcome = self.orchestrator.process(event, TIMEOUT_ELAPSED_EVENT, cancellation).await;
            if let Some(err) = outcome.failure() {
                tracing::warn!(correlation_id = %saga.correlation_id, error = %err, "timeout dispatch failed");
            } else {
                dispatched += 1;
            }
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{NoopAction, StateMachineDefinition, Transition, TransitionAction, TransitionContext};
    use async_trait::async_trait;
    use fc_common::clock::FakeClock;
    use fc_common::error::CoreError;
    use fc_store::InMemorySagaRepository;
    use uuid::Uuid;

    struct MarkTimedOut;
    #[async_trait]
    impl TransitionAction for MarkTimedOut {
        async fn execute(&self, ctx: &mut TransitionContext<'_>) -> Result<(), CoreError> {
            *ctx.data = serde_json::json!({ "timed_out": true });
            Ok(())
        }
    }

    #[tokio::test]
    async fn stale_saga_receives_timeout_elapsed_and_moves_to_final_state() {
        let clock = Arc::new(FakeClock::at_epoch());
        let repository = Arc::new(InMemorySagaRepository::new());
        let definition = StateMachineDefinition::new("order")
            .on_initial("OrderCreated", Transition::new(Arc::new(NoopAction), "AwaitingPayment"))
            .on("AwaitingPayment", TIMEOUT_ELAPSED_EVENT, Transition::to_final(Arc::new(MarkTimedOut), "TimedOut"))
            .final_state("TimedOut");
        let orchestrator = Arc::new(SagaOrchestrator::new(definition, repository.clone(), clock.clone(), Arc::new(())));

        let correlation_id = Uuid::new_v4();
        let cancellation = CancellationToken::new();
        orchestrator
            .process(
                Envelope::event(serde_json::json!({}), clock.now()).with_correlation_id(correlation_id),
                "OrderCreated",
                &cancellation,
            )
            .await;

        let handler = SagaTimeoutHandler::new(
            orchestrator.clone(),
            repository.clone(),
            clock.clone(),
            SagaTimeoutConfig { scan_interval: Duration::from_secs(1), timeout: Duration::from_secs(60) },
        );

        assert_eq!(handler.scan_once(&cancellation).await, 0);
        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(handler.scan_once(&cancellation).await, 1);

        let saga = repository.find(&correlation_id).await.unwrap();
        assert_eq!(saga.state_name, "TimedOut");
        assert!(saga.is_completed);
    }
}
