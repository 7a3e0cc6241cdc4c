//! Error types for the collaborator clients

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when calling an external collaborator
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response arrived (connect, DNS, TLS or body read failure)
    #[error("transport failure: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Non-2xx reply
    #[error("collaborator replied {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("timed out: {0}")]
    Timeout(String),

    /// Router answered but reported an unsuccessful inference
    #[error("Router error: {0}")]
    Router(String),

    /// Body did not match the expected wire type
    #[error("unreadable reply: {0}")]
    ParseError(String),

    #[error("no such endpoint or resource: {0}")]
    NotFound(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::ApiError { status: 404, .. })
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::RequestFailed(err) => err.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(ClientError::api_error(404, "missing").is_not_found());
        assert!(ClientError::NotFound("job".into()).is_not_found());
        assert!(!ClientError::api_error(500, "boom").is_not_found());
    }

    #[test]
    fn test_timeout_classification() {
        assert!(ClientError::Timeout("slow".into()).is_timeout());
        assert!(!ClientError::Router("unsuccessful".into()).is_timeout());
    }

    #[test]
    fn test_server_error_classification() {
        assert!(ClientError::api_error(503, "down").is_server_error());
        assert!(!ClientError::api_error(429, "busy").is_server_error());
    }
}
