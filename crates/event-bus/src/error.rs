use thiserror::Error;

/// Errors that can occur while publishing or handling messages.
#[derive(Debug, Error)]
pub enum BusError {
    /// The payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required metadata entry is missing from the message.
    #[error("Missing metadata entry: {0}")]
    MissingMetadata(&'static str),

    /// The message carries a handler tag no consumer understands.
    #[error("Unknown handler tag: {0}")]
    UnknownHandler(String),

    /// The message could not be delivered to the transport.
    #[error("Publish to topic '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// The handler did not finish before its deadline.
    #[error("Handler timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The handler panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// The handler reported a failure.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// The bus has been shut down.
    #[error("Bus is closed")]
    Closed,
}

impl BusError {
    /// Returns true if handling the same message again may succeed.
    ///
    /// Malformed messages fail identically on every attempt and are
    /// dead-lettered without spending the retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BusError::Serialization(_) | BusError::MissingMetadata(_) | BusError::UnknownHandler(_)
        )
    }

    /// Creates a handler error from any displayable value.
    pub fn handler(reason: impl std::fmt::Display) -> Self {
        BusError::Handler(reason.to_string())
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_messages_are_not_retryable() {
        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(!BusError::Serialization(decode).is_retryable());
        assert!(!BusError::MissingMetadata("handler").is_retryable());
        assert!(!BusError::UnknownHandler("bogus".into()).is_retryable());
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(
            BusError::Publish {
                topic: "reply".into(),
                reason: "connection reset".into()
            }
            .is_retryable()
        );
        assert!(BusError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(BusError::Panicked("boom".into()).is_retryable());
        assert!(BusError::handler("db down").is_retryable());
    }
}
