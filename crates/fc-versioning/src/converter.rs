//! Message versions and converters (C10, §4.7).

use async_trait::async_trait;
use fc_common::cancellation::CancellationToken;
use fc_common::error::CoreError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type Payload = serde_json::Value;

/// A `(major, minor, patch)` triple, ordered lexicographically by field
/// order. Two versions are compatible iff `major` is equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl MessageVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for MessageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Converts a payload between two versions. A single converter may cover a
/// whole `supported_range`, not just its endpoints: [`ConverterRegistry`]
/// treats any two versions both inside that range as directly reachable
/// through this converter.
#[async_trait]
pub trait MessageConverter: Send + Sync {
    /// Inclusive `(min, max)` range this converter accepts on either side
    /// of a conversion. `min <= max` is enforced at registration.
    fn supported_range(&self) -> (MessageVersion, MessageVersion);

    async fn convert(
        &self,
        msg: Payload,
        from: MessageVersion,
        to: MessageVersion,
        cancellation: &CancellationToken,
    ) -> Result<Payload, CoreError>;
}

/// One hop of a [`ConversionPath`].
#[derive(Clone)]
pub struct ConversionStep {
    pub from: MessageVersion,
    pub to: MessageVersion,
    pub converter: Arc<dyn MessageConverter>,
}

/// An ordered, chaining sequence of steps from one version to another.
/// Empty when `from == to`.
#[derive(Clone, Default)]
pub struct ConversionPath {
    pub steps: Vec<ConversionStep>,
}

impl ConversionPath {
    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic_by_major_then_minor_then_patch() {
        assert!(MessageVersion::new(1, 9, 9) < MessageVersion::new(2, 0, 0));
        assert!(MessageVersion::new(2, 0, 0) < MessageVersion::new(2, 1, 0));
        assert!(MessageVersion::new(2, 1, 0) < MessageVersion::new(2, 1, 1));
    }

    #[test]
    fn compatibility_requires_equal_major_only() {
        assert!(MessageVersion::new(1, 0, 0).is_compatible_with(&MessageVersion::new(1, 9, 3)));
        assert!(!MessageVersion::new(1, 9, 3).is_compatible_with(&MessageVersion::new(2, 0, 0)));
    }
}
