//! Error types for the reference server.

use thiserror::Error;
use visitrack_protocol::{LifecycleError, ProtocolError};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A payload failed validation.
    #[error("invalid payload: {0}")]
    Protocol(#[from] ProtocolError),

    /// The lifecycle refused the mutation.
    #[error("lifecycle: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// No record or code with that ID.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record ID is already taken.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The server is not accepting requests.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::Protocol(_)
                | ServerError::Lifecycle(_)
                | ServerError::NotFound(_)
                | ServerError::Duplicate(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Unavailable(_) | ServerError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visitrack_protocol::VisitStatus;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::NotFound("r-1".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(ServerError::Unavailable("down".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn lifecycle_errors_convert() {
        let err: ServerError = LifecycleError::InvalidTransition {
            from: VisitStatus::Finalized,
            action: "cancel",
        }
        .into();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("finalized"));
    }
}
