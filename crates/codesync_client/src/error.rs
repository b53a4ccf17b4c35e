//! Error types for the sync client.

use codesync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while syncing.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The call exceeded the request timeout and was abandoned.
    #[error("request timed out")]
    Timeout,

    /// The server rejected the request body.
    #[error("validation error: {0}")]
    Validation(String),

    /// The server does not accept the verb.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The server answered with an error envelope.
    #[error("server error: {0}")]
    ServerRejected(String),

    /// A body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The operation needs a joined session.
    #[error("not joined to a session")]
    NotJoined,

    /// The local key/value store failed.
    #[error("cache error: {0}")]
    Cache(String),
}

impl ClientError {
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

    /// Returns true if the next tick may succeed where this call failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::Timeout => true,
            ClientError::ServerRejected(_) => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Codec(err.to_string())
    }
}
