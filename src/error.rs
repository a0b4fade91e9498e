//! Error types for the matchmaking engine
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Losing a claim is not an error: it is the `false`
//! branch of `WaitEntryStore::delete_by_id`.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    /// A submission was rejected; the message is shown to the user verbatim
    #[error("{message}")]
    ValidationError { message: String },

    #[error("Wait entry store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Notification to {connection_id} failed: {message}")]
    NotificationFailure {
        connection_id: String,
        message: String,
    },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid client request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Shorthand for a user-facing validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        MatchmakingError::ValidationError {
            message: message.into(),
        }
    }

    /// Shorthand for a store failure
    pub fn store(message: impl Into<String>) -> Self {
        MatchmakingError::StoreUnavailable {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = MatchmakingError::validation("Level is too low for this activity");
        assert_eq!(err.to_string(), "Level is too low for this activity");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = MatchmakingError::store("lock poisoned").into();
        match err.downcast_ref::<MatchmakingError>() {
            Some(MatchmakingError::StoreUnavailable { message }) => {
                assert_eq!(message, "lock poisoned")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
