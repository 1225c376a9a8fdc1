//! Saga orchestrator (C8, §4.5).
//!
//! Grounded in shape on `other_examples`'s NATS saga executor: a
//! correlation-keyed, versioned instance loaded from a repository, advanced
//! by one matching transition per incoming event, and persisted back with
//! an optimistic-concurrency guard. Generalized here from that example's
//! single hardcoded state machine to a caller-supplied
//! [`StateMachineDefinition`], and from its in-process `PersistedSagaState`
//! map to `fc-store`'s [`SagaRepository`].

use crate::compensation::CompensationContext;
use crate::state_machine::{Payload, StateMachineDefinition, TransitionContext, TransitionOutcome};
use fc_common::cancellation::CancellationToken;
use fc_common::clock::Clock;
use fc_common::error::CoreError;
use fc_common::message::Envelope;
use fc_common::processing::ProcessingResult;
use fc_store::{SagaInstance, SagaRepository};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Drives one saga type's state machine against a [`SagaRepository`].
///
/// Compensation stacks are kept in an in-process map keyed by correlation
/// id, not in the repository: actions are native trait objects and cannot
/// be serialized, so a compensation registered before a process restart is
/// lost along with it. Sagas that need compensation to survive a restart
/// must re-derive it from `saga_instance.data` in their own actions; this
/// orchestrator only guarantees the stack survives across transitions
/// processed by the same instance.
pub struct SagaOrchestrator {
    definition: StateMachineDefinition,
    repository: Arc<dyn SagaRepository>,
    clock: Arc<dyn Clock>,
    services: Arc<dyn std::any::Any + Send + Sync>,
    compensations: Mutex<HashMap<Uuid, CompensationContext>>,
}

impl SagaOrchestrator {
    pub fn new(
        definition: StateMachineDefinition,
        repository: Arc<dyn SagaRepository>,
        clock: Arc<dyn Clock>,
        services: Arc<dyn std::any::Any + Send + Sync>,
    ) -> Self {
        Self {
            definition,
            repository,
            clock,
            services,
            compensations: Mutex::new(HashMap::new()),
        }
    }

    pub fn saga_type(&self) -> &str {
        &self.definition.saga_type
    }

    /// Advances (or creates) the saga addressed by `event.correlation_id`
    /// per §4.5 steps 1-6. A `Failure` result carrying
    /// [`CoreError::Concurrency`] is retryable: the caller should reload
    /// and re-dispatch the same event.
    pub async fn process(
        &self,
        event: Envelope<Payload>,
        event_type: &str,
        cancellation: &CancellationToken,
    ) -> ProcessingResult<TransitionOutcome> {
        let Some(correlation_id) = event.correlation_id else {
            return ProcessingResult::Failure(CoreError::validation(
                "saga event is missing a correlation id",
            ));
        };

        match self.repository.find(&correlation_id).await {
            Some(saga) => match self.definition.during_transition(&saga.state_name, event_type) {
                None => {
                    tracing::debug!(%correlation_id, state = %saga.state_name, event_type, "event ignored: no transition for current state");
                    ProcessingResult::Success(TransitionOutcome::Ignored)
                }
                Some(transition) => {
                    self.apply(saga, transition, &event, cancellation).await
                }
            },
            None => match self.definition.initial_transition(event_type) {
                None => {
                    tracing::debug!(%correlation_id, event_type, "event ignored: no initial transition matches");
                    ProcessingResult::Success(TransitionOutcome::NoMatchingInitialTransition)
                }
                Some(transition) => {
                    let created = SagaInstance::new(correlation_id, self.definition.saga_type.clone(), self.clock.now());
                    match self.repository.add(created).await {
                        Ok(saga) => self.apply(saga, transition, &event, cancellation).await,
                        Err(err) => ProcessingResult::Failure(err),
                    }
                }
            },
        }
    }

    async fn apply(
        &self,
        mut saga: SagaInstance,
        transition: &crate::state_machine::Transition,
        event: &Envelope<Payload>,
        cancellation: &CancellationToken,
    ) -> ProcessingResult<TransitionOutcome> {
        let mut comp_ctx = {
            let mut guard = self.compensations.lock();
            guard.remove(&saga.correlation_id).unwrap_or_default()
        };

        let action_result = {
            let mut ctx = TransitionContext {
                data: &mut saga.data,
                event,
                services: self.services.as_ref(),
                compensation: &mut comp_ctx,
                cancellation,
            };
            transition.action.execute(&mut ctx).await
        };

        self.compensations.lock().insert(saga.correlation_id, comp_ctx);

        if let Err(err) = action_result {
            return ProcessingResult::Failure(err);
        }

        if let Some(next_state) = &transition.next_state {
            saga.state_name = next_state.clone();
        }
        if transition.is_final {
            saga.is_completed = true;
        }

        let updated = saga.next_version(self.clock.now());
        match self.repository.update(updated).await {
            Ok(saved) => ProcessingResult::Success(TransitionOutcome::Applied {
                correlation_id: saved.correlation_id,
                state_name: saved.state_name,
                is_completed: saved.is_completed,
            }),
            Err(err) => ProcessingResult::Failure(err),
        }
    }

    /// Fires the correlation id's registered compensations, if any. Safe to
    /// call more than once; the second call is a no-op (§4.5).
    pub async fn compensate(&self, correlation_id: &Uuid, cancellation: &CancellationToken) -> Result<(), CoreError> {
        let mut comp_ctx = {
            let mut guard = self.compensations.lock();
            guard.remove(correlation_id).unwrap_or_default()
        };
        let result = comp_ctx.fire_all(cancellation).await;
        self.compensations.lock().insert(*correlation_id, comp_ctx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compensation::CompensationAction;
    use crate::state_machine::{NoopAction, Transition, TransitionAction};
    use async_trait::async_trait;
    use fc_common::clock::FakeClock;
    use fc_store::InMemorySagaRepository;

    struct MarkPaid;
    #[async_trait]
    impl TransitionAction for MarkPaid {
        async fn execute(&self, ctx: &mut TransitionContext<'_>) -> Result<(), CoreError> {
            *ctx.data = serde_json::json!({ "paid": true });
            ctx.compensation.register("refund-payment", Arc::new(RefundAction));
            Ok(())
        }
    }

    struct RefundAction;
    #[async_trait]
    impl CompensationAction for RefundAction {
        async fn compensate(&self, _cancellation: &CancellationToken) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn order_definition() -> StateMachineDefinition {
        StateMachineDefinition::new("order")
            .on_initial("OrderCreated", Transition::new(Arc::new(NoopAction), "AwaitingPayment"))
            .on("AwaitingPayment", "PaymentReceived", Transition::new(Arc::new(MarkPaid), "Shipping"))
            .on("Shipping", "Shipped", Transition::to_final(Arc::new(NoopAction), "Completed"))
            .final_state("Completed")
    }

    fn orchestrator() -> (SagaOrchestrator, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::at_epoch());
        let orchestrator = SagaOrchestrator::new(
            order_definition(),
            Arc::new(InMemorySagaRepository::new()),
            clock.clone(),
            Arc::new(()),
        );
        (orchestrator, clock)
    }

    #[tokio::test]
    async fn unmatched_event_creates_nothing_and_is_ignored() {
        let (orchestrator, clock) = orchestrator();
        let event = Envelope::event(serde_json::json!({}), clock.now()).with_correlation_id(Uuid::new_v4());
        let outcome = orchestrator.process(event, "SomethingElse", &CancellationToken::new()).await;
        assert!(matches!(outcome.success().unwrap(), TransitionOutcome::NoMatchingInitialTransition));
    }

    #[tokio::test]
    async fn full_happy_path_reaches_final_state_and_runs_compensations_once() {
        let (orchestrator, clock) = orchestrator();
        let correlation_id = Uuid::new_v4();
        let cancellation = CancellationToken::new();

        let created = Envelope::event(serde_json::json!({}), clock.now()).with_correlation_id(correlation_id);
        let outcome = orchestrator.process(created, "OrderCreated", &cancellation).await;
        assert!(matches!(
            outcome.success().unwrap(),
            TransitionOutcome::Applied { state_name, is_completed: false, .. } if state_name == "AwaitingPayment"
        ));

        let paid = Envelope::event(serde_json::json!({}), clock.now()).with_correlation_id(correlation_id);
        let outcome = orchestrator.process(paid, "PaymentReceived", &cancellation).await;
        assert!(matches!(
            outcome.success().unwrap(),
            TransitionOutcome::Applied { state_name, .. } if state_name == "Shipping"
        ));

        let shipped = Envelope::event(serde_json::json!({}), clock.now()).with_correlation_id(correlation_id);
        let outcome = orchestrator.process(shipped, "Shipped", &cancellation).await;
        assert!(matches!(
            outcome.success().unwrap(),
            TransitionOutcome::Applied { is_completed: true, .. }
        ));

        orchestrator.compensate(&correlation_id, &cancellation).await.unwrap();
        orchestrator.compensate(&correlation_id, &cancellation).await.unwrap();
    }

    #[tokio::test]
    async fn event_with_no_correlation_id_fails_validation() {
        let (orchestrator, clock) = orchestrator();
        let event = Envelope::event(serde_json::json!({}), clock.now());
        let outcome = orchestrator.process(event, "OrderCreated", &CancellationToken::new()).await;
        let err = outcome.failure().unwrap();
        assert_eq!(err.kind(), fc_common::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn event_with_no_transition_for_current_state_is_ignored_not_an_error() {
        let (orchestrator, clock) = orchestrator();
        let correlation_id = Uuid::new_v4();
        let cancellation = CancellationToken::new();
        orchestrator
            .process(Envelope::event(serde_json::json!({}), clock.now()).with_correlation_id(correlation_id), "OrderCreated", &cancellation)
            .await;

        let stray = Envelope::event(serde_json::json!({}), clock.now()).with_correlation_id(correlation_id);
        let outcome = orchestrator.process(stray, "Shipped", &cancellation).await;
        assert!(matches!(outcome.success().unwrap(), TransitionOutcome::Ignored));
    }
}
