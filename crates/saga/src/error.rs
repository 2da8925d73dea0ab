//! Saga error types.

use domain::{DomainError, SagaStep};
use event_bus::BusError;
use inventory::LedgerError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A participant could not complete its step.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: SagaStep, reason: String },

    /// A participant could not compensate its step.
    #[error("Compensation of step '{step}' failed: {reason}")]
    CompensationFailed { step: SagaStep, reason: String },

    /// Inventory ledger error.
    #[error("Inventory ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Transport error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SagaError> for BusError {
    /// Keeps malformed-message errors permanent so the router dead-letters
    /// them without retrying.
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::Bus(e) => e,
            SagaError::Serialization(e) => BusError::Serialization(e),
            SagaError::Domain(DomainError::UnknownHandler(tag)) => BusError::UnknownHandler(tag),
            SagaError::Domain(DomainError::Serialization(e)) => BusError::Serialization(e),
            other => BusError::handler(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_messages_stay_permanent() {
        let unknown: BusError = SagaError::Domain(DomainError::UnknownHandler("x".into())).into();
        assert!(!unknown.is_retryable());

        let missing: BusError = SagaError::Bus(BusError::MissingMetadata("handler")).into();
        assert!(!missing.is_retryable());

        let decode = serde_json::from_str::<u8>("[]").unwrap_err();
        let decode: BusError = SagaError::Serialization(decode).into();
        assert!(!decode.is_retryable());
    }

    #[test]
    fn publish_failures_stay_retryable() {
        let err: BusError = SagaError::Bus(BusError::Publish {
            topic: "order.create".into(),
            reason: "broker down".into(),
        })
        .into();
        assert!(err.is_retryable());
    }
}
