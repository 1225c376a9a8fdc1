//! Saga orchestration (C8, §4.5-§4.6).
//!
//! A saga type is a [`state_machine::StateMachineDefinition`]: which event
//! creates an instance, which event advances it out of each state, and
//! which states are terminal. [`orchestrator::SagaOrchestrator`] drives one
//! definition against an `fc-store::SagaRepository`, and
//! [`timeout::SagaTimeoutHandler`] periodically nudges instances that have
//! stopped receiving events.

pub mod compensation;
pub mod orchestrator;
pub mod state_machine;
pub mod timeout;

pub use compensation::{CompensationAction, CompensationContext};
pub use orchestrator::SagaOrchestrator;
pub use state_machine::{
    NoopAction, Payload, StateMachineDefinition, Transition, TransitionAction, TransitionContext, TransitionOutcome,
};
pub use timeout::{SagaTimeoutConfig, SagaTimeoutHandler, TIMEOUT_ELAPSED_EVENT};
