//! State machine definition (§3, §4.5).
//!
//! A saga type owns one `initial_transitions` map (event type -> transition
//! that creates the instance) and one `during` map (state -> event type ->
//! transition). Both are keyed by a caller-chosen event type string rather
//! than a Rust enum, the same opaque-key shape `fc-resilience`'s
//! `CircuitBreakerRegistry<K>` and `fc-pipeline`'s `Payload` use to keep the
//! core decoupled from any one application's message types.

use crate::compensation::CompensationContext;
use async_trait::async_trait;
use fc_common::cancellation::CancellationToken;
use fc_common::error::CoreError;
use fc_common::message::Envelope;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub type Payload = serde_json::Value;

/// Everything a transition's action needs: the saga's own data (mutable,
/// the only part of [`SagaInstance`] an action is expected to touch), the
/// triggering event, an opaque services handle for side effects such as
/// publishing outbox entries, and the compensation stack to register
/// undo actions onto.
pub struct TransitionContext<'a> {
    pub data: &'a mut Payload,
    pub event: &'a Envelope<Payload>,
    pub services: &'a (dyn std::any::Any + Send + Sync),
    pub compensation: &'a mut CompensationContext,
    pub cancellation: &'a CancellationToken,
}

impl<'a> TransitionContext<'a> {
    /// Downcasts the services handle a caller installed on the orchestrator.
    /// Returns `None` if the orchestrator wasn't built with a matching type.
    pub fn services<T: 'static>(&self) -> Option<&T> {
        self.services.downcast_ref::<T>()
    }
}

#[async_trait]
pub trait TransitionAction: Send + Sync {
    async fn execute(&self, ctx: &mut TransitionContext<'_>) -> Result<(), CoreError>;
}

/// A no-op action, useful for transitions that only change state.
pub struct NoopAction;

#[async_trait]
impl TransitionAction for NoopAction {
    async fn execute(&self, _ctx: &mut TransitionContext<'_>) -> Result<(), CoreError> {
        Ok(())
    }
}

pub struct Transition {
    pub action: Arc<dyn TransitionAction>,
    pub next_state: Option<String>,
    pub is_final: bool,
}

impl Transition {
    pub fn new(action: Arc<dyn TransitionAction>, next_state: impl Into<String>) -> Self {
        Self { action, next_state: Some(next_state.into()), is_final: false }
    }

    pub fn to_final(action: Arc<dyn TransitionAction>, next_state: impl Into<String>) -> Self {
        Self { action, next_state: Some(next_state.into()), is_final: true }
    }
}

/// The per-saga-type routing table: which event starts a new instance,
/// which event advances an existing one out of a given state, and which
/// states are terminal.
pub struct StateMachineDefinition {
    pub saga_type: String,
    initial_transitions: HashMap<String, Transition>,
    during: HashMap<String, HashMap<String, Transition>>,
    final_states: HashSet<String>,
}

impl StateMachineDefinition {
    pub fn new(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: saga_type.into(),
            initial_transitions: HashMap::new(),
            during: HashMap::new(),
            final_states: HashSet::new(),
        }
    }

    pub fn on_initial(mut self, event_type: impl Into<String>, transition: Transition) -> Self {
        self.initial_transitions.insert(event_type.into(), transition);
        self
    }

    pub fn on(mut self, state: impl Into<String>, event_type: impl Into<String>, transition: Transition) -> Self {
        self.during.entry(state.into()).or_default().insert(event_type.into(), transition);
        self
    }

    pub fn final_state(mut self, state: impl Into<String>) -> Self {
        self.final_states.insert(state.into());
        self
    }

    pub fn is_final_state(&self, state: &str) -> bool {
        self.final_states.contains(state)
    }

    pub(crate) fn initial_transition(&self, event_type: &str) -> Option<&Transition> {
        self.initial_transitions.get(event_type)
    }

    pub(crate) fn during_transition(&self, state: &str, event_type: &str) -> Option<&Transition> {
        self.during.get(state).and_then(|m| m.get(event_type))
    }
}

/// What [`crate::orchestrator::SagaOrchestrator::process`] actually did.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied { correlation_id: uuid::Uuid, state_name: String, is_completed: bool },
    /// An existing saga received an event its current state has no
    /// transition for; ignored, not an error (§4.5).
    Ignored,
    /// No saga exists for the correlation id and no initial transition
    /// matches the event type; ignored, not an error.
    NoMatchingInitialTransition,
}
