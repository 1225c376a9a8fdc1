//! Transport publish sink (§6).
//!
//! The dispatcher's only collaborator outside the store: an abstract
//! "send this envelope somewhere" capability. No concrete transport (a
//! broker client, an HTTP endpoint) ships in this workspace — adapters
//! implement this trait from outside.

use async_trait::async_trait;
use fc_common::cancellation::CancellationToken;
use fc_common::error::CoreError;
use fc_common::message::Envelope;

pub type Payload = serde_json::Value;

#[async_trait]
pub trait TransportSink: Send + Sync {
    async fn publish(
        &self,
        envelope: &Envelope<Payload>,
        destination: &str,
        cancellation: &CancellationToken,
    ) -> Result<(), CoreError>;
}
