//! The processing pipeline (C4) and event bus fan-out (C12).

pub mod decorators;
pub mod event_bus;
pub mod processor;
pub mod telemetry;

pub use decorators::{
    CircuitBreakerDecorator, CorrelationDecorator, ErrorHandlingDecorator, FingerprintFn,
    LoggingDecorator, MetricsDecorator, PipelineBuilder, RetryDecorator, ValidationDecorator,
};
pub use event_bus::{EventBus, PublishSummary};
pub use processor::{NoopValidator, Payload, Processor, Validator};
pub use telemetry::{TelemetrySink, TracingTelemetrySink};
