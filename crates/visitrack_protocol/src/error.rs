//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or validating wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload is not valid JSON or does not match the expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A required field is present but empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Field values are individually valid but inconsistent together.
    #[error("inconsistent record {id}: {reason}")]
    Inconsistent {
        /// Record ID.
        id: String,
        /// What is inconsistent.
        reason: String,
    },

    /// Unknown push topic name.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates an invalid payload error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }
}
