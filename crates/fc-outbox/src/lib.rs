//! The outbox dispatcher (C6, §4.2).
//!
//! At-least-once publication of messages staged by the application.
//! `fc-store::OutboxStore::add` is the atomic-write contract of §4.2;
//! this crate owns the poll loop, retry scheduling, and retention cleanup
//! built on top of it.

pub mod cleanup;
pub mod dispatcher;
pub mod transport;

pub use cleanup::OutboxCleanup;
pub use dispatcher::{DispatchReport, DispatcherConfig, OutboxDispatcher};
pub use transport::TransportSink;
