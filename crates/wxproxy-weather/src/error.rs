//! Weather-specific error types.

use thiserror::Error;
use wxproxy_core::ValidationError;

/// Failure of an upstream provider call.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// A required setting is absent. Raised before any network I/O.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Connection-level failure after retries. The message carries no URL.
    #[error("Weather API request failed: {0}")]
    Transport(String),

    /// Non-2xx response after retries (or a non-retryable status).
    #[error("Weather API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// 2xx response whose body is not JSON.
    #[error("Weather API returned an invalid body: {0}")]
    InvalidBody(String),
}

impl UpstreamError {
    /// Configuration problems are fixed by the operator, not retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of a dispatch: bad input, or the upstream call failed.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Cache store failure. Never propagated past the upstream client.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation timed out")]
    Timeout,

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}
