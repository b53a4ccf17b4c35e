//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A required field was absent. The store is left untouched.
    #[error("{0}")]
    Validation(String),

    /// Malformed request body.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unsupported verb for the endpoint.
    #[error("Method {0} Not Allowed")]
    MethodNotAllowed(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Validation(_)
                | ServerError::InvalidRequest(_)
                | ServerError::MethodNotAllowed(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_) | ServerError::Io(_))
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Validation(_) | ServerError::InvalidRequest(_) => 400,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::Internal(_) | ServerError::Io(_) => 500,
        }
    }
}

impl From<codesync_protocol::ProtocolError> for ServerError {
    fn from(err: codesync_protocol::ProtocolError) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::Validation("missing".into()).is_client_error());
        assert!(ServerError::MethodNotAllowed("DELETE".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::Validation("x".into()).status_code(), 400);
        assert_eq!(ServerError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(ServerError::MethodNotAllowed("PATCH".into()).status_code(), 405);
        assert_eq!(ServerError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn error_display() {
        let err = ServerError::MethodNotAllowed("DELETE".into());
        assert_eq!(err.to_string(), "Method DELETE Not Allowed");

        let err = ServerError::Validation("Code content is required".into());
        assert_eq!(err.to_string(), "Code content is required");
    }
}
