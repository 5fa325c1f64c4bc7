//! Error types for the sandbridge library.
//!
//! This module provides structured, typed errors for every failure the
//! submission pipeline can observe. The library never panics; all errors
//! are returned as `Result` values and the scan loop decides per file
//! whether to skip, retry later, or collapse to a zero score.

use std::time::Duration;
use thiserror::Error;

/// The main error type for sandbox operations.
///
/// The variants deliberately separate a failure to *reach* the sandbox
/// (`Transport`) from a sandbox answer that could not be *understood*
/// (`MalformedResponse`). "Not found" and "not ready yet" are not errors
/// at all; they are `None` values on the client operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The sandbox could not be reached or the exchange broke off.
    #[error("transport error talking to '{endpoint}': {message}")]
    Transport {
        /// Endpoint path that was being requested.
        endpoint: String,
        /// Error message describing the failure.
        message: String,
    },

    /// The sandbox answered with a body that is not the expected JSON shape.
    #[error("malformed response from '{endpoint}': {details}")]
    MalformedResponse {
        /// Endpoint path that produced the response.
        endpoint: String,
        /// What was wrong with the body.
        details: String,
    },

    /// The bearer token was rejected.
    #[error("authentication rejected by '{endpoint}' (HTTP {status})")]
    AuthenticationFailed {
        /// Endpoint path that rejected the token.
        endpoint: String,
        /// HTTP status code returned.
        status: u16,
    },

    /// The sandbox asked us to slow down.
    #[error("rate limited by '{endpoint}': retry after {retry_after:?}")]
    RateLimited {
        /// Endpoint path that rate limited the request.
        endpoint: String,
        /// Suggested wait time, when the sandbox provided one.
        retry_after: Option<Duration>,
    },

    /// An I/O error occurred while reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file disappeared before it could be read.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl SandboxError {
    /// Returns `true` if the sandbox sent something we could not interpret.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }

    /// Returns `true` if the sandbox could not be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` if the same request may succeed on a later cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::RateLimited { .. }
                | Self::Io(_)
                | Self::FileNotFound { .. }
        )
    }

    /// Returns the wait the sandbox asked for, if it rate limited us.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the endpoint path if this error is associated with one.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Transport { endpoint, .. }
            | Self::MalformedResponse { endpoint, .. }
            | Self::AuthenticationFailed { endpoint, .. }
            | Self::RateLimited { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// Creates a `Transport` error.
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a `MalformedResponse` error.
    pub fn malformed(endpoint: impl Into<String>, details: impl Into<String>) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.into(),
            details: details.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_is_distinct_from_transport() {
        let malformed = SandboxError::malformed("/tasks/view/1", "missing task.status");
        assert!(malformed.is_malformed());
        assert!(!malformed.is_transport());
        assert!(!malformed.is_recoverable());

        let transport = SandboxError::transport("/tasks/view/1", "connection refused");
        assert!(transport.is_transport());
        assert!(!transport.is_malformed());
        assert!(transport.is_recoverable());
    }

    #[test]
    fn test_retry_after() {
        let limited = SandboxError::RateLimited {
            endpoint: "/tasks/view/1".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(30)));
        assert!(limited.is_recoverable());
        assert_eq!(SandboxError::transport("/x", "down").retry_after(), None);
    }

    #[test]
    fn test_endpoint() {
        let err = SandboxError::AuthenticationFailed {
            endpoint: "/tasks/create/file".into(),
            status: 401,
        };
        assert_eq!(err.endpoint(), Some("/tasks/create/file"));

        let io_err = SandboxError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "test error",
        ));
        assert_eq!(io_err.endpoint(), None);
        assert!(io_err.is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = SandboxError::malformed("/files/view/sha256/abc", "sample has no tasks");
        let text = err.to_string();
        assert!(text.contains("/files/view/sha256/abc"));
        assert!(text.contains("sample has no tasks"));
    }
}
