//! Error types for protocol encoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol bodies.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The body was not valid JSON for the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A body was required but none was sent.
    #[error("missing request body")]
    MissingBody,
}
