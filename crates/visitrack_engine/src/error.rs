//! Error types for the engine.

use thiserror::Error;
use visitrack_protocol::{LifecycleError, Topic, VisitStatus};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the engine.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Mutation input was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// The lifecycle has no such transition.
    #[error("invalid transition: cannot {action} a record in status {from}")]
    InvalidTransition {
        /// Current status.
        from: VisitStatus,
        /// Requested action.
        action: &'static str,
    },

    /// A query response arrived after a newer load was issued.
    #[error("stale response: load {sequence} superseded by load {latest}")]
    StaleResponse {
        /// Sequence of the discarded response.
        sequence: u64,
        /// Latest issued sequence.
        latest: u64,
    },

    /// Query or push channel failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A push payload failed shape validation.
    #[error("malformed event on {topic}: {reason}")]
    MalformedEvent {
        /// Topic it arrived on.
        topic: Topic,
        /// Why it was refused.
        reason: String,
    },

    /// The subscriber already holds an active subscription to the topic.
    #[error("already subscribed to {topic}")]
    AlreadySubscribed {
        /// Topic.
        topic: Topic,
    },

    /// The record is unknown to the event source.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The engine was disposed.
    #[error("engine disposed")]
    Disposed,
}

impl EngineError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport { retryable: true, .. })
    }

    /// Returns true for errors that are logged but never shown to a user.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            EngineError::StaleResponse { .. } | EngineError::MalformedEvent { .. }
        )
    }
}

impl From<LifecycleError> for EngineError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(message) => EngineError::Validation(message),
            LifecycleError::InvalidTransition { from, action } => {
                EngineError::InvalidTransition { from, action }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::transport_retryable("connection reset").is_retryable());
        assert!(!EngineError::transport_fatal("bad request").is_retryable());
        assert!(!EngineError::Validation("no access points".into()).is_retryable());
    }

    #[test]
    fn silent_errors() {
        assert!(EngineError::StaleResponse {
            sequence: 1,
            latest: 2
        }
        .is_silent());
        assert!(EngineError::MalformedEvent {
            topic: Topic::RecordUpdated,
            reason: "bad".into()
        }
        .is_silent());
        assert!(!EngineError::transport_retryable("down").is_silent());
    }

    #[test]
    fn lifecycle_errors_convert() {
        let err: EngineError = LifecycleError::InvalidTransition {
            from: VisitStatus::Cancelled,
            action: "finalize",
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot finalize a record in status cancelled"
        );

        let err: EngineError = LifecycleError::Validation("x".into()).into();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
