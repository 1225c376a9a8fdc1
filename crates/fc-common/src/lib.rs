//! Shared types for the FlowCatalyst messaging core: the message envelope,
//! processing context/result, the injectable clock, cancellation, and the
//! error taxonomy. Every other crate in this workspace depends on this one
//! and nothing else cyclically.

pub mod cancellation;
pub mod clock;
pub mod error;
pub mod logging;
pub mod message;
pub mod processing;

pub use cancellation::CancellationToken;
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{CoreError, ErrorKind, Result};
pub use message::{Envelope, MessageKind, Metadata};
pub use processing::{HandlerType, ProcessingContext, ProcessingResult};
