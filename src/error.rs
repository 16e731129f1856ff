//! Closed error taxonomy for all client operations
//!
//! Transport failures are classified exactly once at the HTTP boundary into
//! this enum; retry and propagation logic can then be an exhaustive match
//! instead of an open-ended exception hierarchy. Callers never see an
//! unclassified failure.

use std::time::Duration;

use thiserror::Error;

/// Error returned by every public client operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The requested entity does not exist. Terminal, never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote API rejected the call for rate limiting. Retryable; the
    /// optional hint is the server's minimum wait before the next attempt.
    #[error("rate limited by remote API (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Connectivity failure or per-call timeout. Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// Any other API failure, carrying the HTTP status code. Server errors
    /// (5xx) are retryable, everything else is terminal.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl ApiError {
    /// Whether the retry executor may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound(_) => false,
        }
    }

    /// Server-specified minimum wait, if the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification_is_exhaustive() {
        assert!(ApiError::Network("refused".into()).is_retryable());
        assert!(ApiError::RateLimited { retry_after: None }.is_retryable());
        assert!(ApiError::Api { status: 500, message: "boom".into() }.is_retryable());
        assert!(!ApiError::NotFound("user 1".into()).is_retryable());
        assert!(!ApiError::Api { status: 400, message: "bad ids".into() }.is_retryable());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let hint = Duration::from_secs(4);
        let err = ApiError::RateLimited { retry_after: Some(hint) };
        assert_eq!(err.retry_after(), Some(hint));
        assert_eq!(ApiError::Network("x".into()).retry_after(), None);
    }

    #[test]
    fn display_carries_status() {
        let err = ApiError::Api { status: 403, message: "forbidden".into() };
        assert!(err.to_string().contains("403"));
    }
}
