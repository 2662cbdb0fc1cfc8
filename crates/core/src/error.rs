//! Error types for ferry-core
//!
//! Provides the unified error taxonomy shared by all backends, plus the
//! classification used by the retry policy.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for ferry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ferry operations
#[derive(Error, Debug)]
pub enum Error {
    /// A required environment variable is absent or empty
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// A credential was present but could not be decoded or parsed
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Unknown backend kind selector
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Invalid remote path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Transient network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// Backend explicitly signaled throttling (retryable with hint)
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Server-suggested wait before the next attempt
        retry_after: Option<Duration>,
    },

    /// Access token or session is no longer valid; one refresh cycle is
    /// attempted by the adapter before this surfaces
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Authentication failed outright (bad key, rejected credentials)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Revision mismatch or destination occupied on write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Reference does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// All retry attempts were consumed; wraps the last transient failure
    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Caller-requested abort
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

/// Retry category of a failure, as decided by a backend classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connection/timeout class; retry with exponential backoff
    Transient,
    /// Throttled; retry honoring the optional server hint
    RateLimited(Option<Duration>),
    /// Never retried; propagates on first occurrence
    Fatal,
}

impl Error {
    /// Default classification, used when an adapter has nothing
    /// backend-specific to add.
    pub fn class_hint(&self) -> ErrorClass {
        match self {
            Error::Network(_) | Error::Io(_) => ErrorClass::Transient,
            Error::RateLimited { retry_after, .. } => ErrorClass::RateLimited(*retry_after),
            _ => ErrorClass::Fatal,
        }
    }

    /// Whether this error is the terminal wrapper produced by the retry
    /// policy rather than a direct failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::RetriesExhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_hint_transient() {
        assert_eq!(
            Error::Network("reset".into()).class_hint(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_class_hint_rate_limited_carries_hint() {
        let err = Error::RateLimited {
            message: "throttled".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(
            err.class_hint(),
            ErrorClass::RateLimited(Some(Duration::from_secs(7)))
        );
    }

    #[test]
    fn test_class_hint_fatal() {
        assert_eq!(Error::Auth("bad key".into()).class_hint(), ErrorClass::Fatal);
        assert_eq!(
            Error::NotFound("a/b".into()).class_hint(),
            ErrorClass::Fatal
        );
        assert_eq!(Error::Cancelled.class_hint(), ErrorClass::Fatal);
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = Error::RetriesExhausted {
            attempts: 5,
            source: Box::new(Error::Network("timeout".into())),
        };
        assert!(err.is_exhausted());
        assert!(err.to_string().contains("5 attempts"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_error_display() {
        let err = Error::MissingCredential("SFTP_HOST".into());
        assert_eq!(err.to_string(), "Missing credential: SFTP_HOST");

        let err = Error::UnsupportedBackend("ftp".into());
        assert_eq!(err.to_string(), "Unsupported backend: ftp");

        let err = Error::RateLimited {
            message: "too_many_write_operations".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.to_string(), "Rate limited: too_many_write_operations");
    }
}
