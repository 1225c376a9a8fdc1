//! Error taxonomy (C11).
//!
//! Every failure surfaced by the core carries a stable machine-readable
//! code and, where one exists, a remediation hint a caller can show to an
//! operator. `Cancellation` is deliberately its own kind rather than a flavor
//! of `Handler` failure: a cancelled unit of work is not a failed one, and
//! callers that fold the two together end up retrying things that were
//! asked to stop.

use thiserror::Error;

/// Coarse category a [`CoreError`] belongs to, used for metrics and retry
/// classification without string-matching error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Handler,
    TransientInfrastructure,
    CircuitOpen,
    Concurrency,
    Conversion,
    Cancellation,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("handler error: {message}")]
    Handler {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("transient infrastructure error: {message}")]
    TransientInfrastructure {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("circuit open for {fingerprint}")]
    CircuitOpen { fingerprint: String },

    #[error("concurrency conflict: {message}")]
    Concurrency { message: String },

    #[error("conversion failed: {message}")]
    Conversion { message: String },

    #[error("cancelled")]
    Cancellation,
}

impl CoreError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            source: None,
        }
    }

    pub fn handler_with_source(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Handler {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientInfrastructure {
            message: message.into(),
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Handler { .. } => ErrorKind::Handler,
            Self::TransientInfrastructure { .. } => ErrorKind::TransientInfrastructure,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Concurrency { .. } => ErrorKind::Concurrency,
            Self::Conversion { .. } => ErrorKind::Conversion,
            Self::Cancellation => ErrorKind::Cancellation,
        }
    }

    /// A short, stable identifier safe to log, alert on, or compare in tests.
    /// Unlike the `Display` message this never embeds free-form text, so it
    /// won't shift when a handler's error message changes wording.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::Handler { .. } => "HANDLER_ERROR",
            Self::TransientInfrastructure { .. } => "TRANSIENT_INFRASTRUCTURE_ERROR",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Concurrency { .. } => "CONCURRENCY_CONFLICT",
            Self::Conversion { .. } => "CONVERSION_FAILED",
            Self::Cancellation => "CANCELLED",
        }
    }

    /// True for failures a caller may retry as-is (same inputs, later time).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientInfrastructure | ErrorKind::CircuitOpen | ErrorKind::Concurrency
        )
    }

    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            Self::Configuration { .. } => {
                Some("check the component's configuration values before retrying")
            }
            Self::CircuitOpen { .. } => {
                Some("wait for the circuit's reset timeout to elapse before retrying")
            }
            Self::Concurrency { .. } => {
                Some("reload the latest version and reapply the change")
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_its_own_kind() {
        let err = CoreError::Cancellation;
        assert_eq!(err.kind(), ErrorKind::Cancellation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_errors_are_retryable() {
        let err = CoreError::transient("connection reset");
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "TRANSIENT_INFRASTRUCTURE_ERROR");
    }

    #[test]
    fn circuit_open_carries_remediation_hint() {
        let err = CoreError::CircuitOpen {
            fingerprint: "order-service".into(),
        };
        assert!(err.remediation_hint().is_some());
    }
}
