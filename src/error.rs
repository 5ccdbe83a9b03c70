//! Heimdall error types

use std::time::Duration;

/// Heimdall error types
#[derive(Debug, thiserror::Error)]
pub enum HeimdallError {
    // Admission errors (surfaced to the caller)
    #[error("rate limit exceeded: max {limit} requests per {}s ({class})", window.as_secs())]
    RateLimitExceeded {
        class: String,
        limit: u32,
        window: Duration,
    },

    #[error("too many concurrent requests for {route} (limit {limit})")]
    TooManyConcurrentRequests { route: String, limit: usize },

    #[error("request timeout after {after:?}")]
    RequestTimeout { after: Duration },

    // Operation errors
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("upstream provider {provider} failed: {message}")]
    Upstream { provider: String, message: String },

    /// The external cache / counter store failed or is unreachable.
    ///
    /// Absorbed by the cache (treated as a miss) and by the shared rate
    /// limiter (fail-open); only raw [`SharedStore`](crate::backend::SharedStore)
    /// calls ever return it.
    #[error("store error: {0}")]
    Store(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HeimdallError {
    /// Whether a retry of the same operation may succeed.
    ///
    /// Admission rejections are never transient from the pipeline's point
    /// of view: retrying them internally would defeat the backpressure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HeimdallError::Timeout { .. } | HeimdallError::Upstream { .. } | HeimdallError::Store(_)
        )
    }

    /// Suggested client wait before retrying, when one is known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HeimdallError::RateLimitExceeded { window, .. } => Some(*window),
            _ => None,
        }
    }

    /// HTTP-style status for the signal this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            HeimdallError::RateLimitExceeded { .. }
            | HeimdallError::TooManyConcurrentRequests { .. } => 429,
            HeimdallError::RequestTimeout { .. } => 408,
            HeimdallError::InvalidInput(_) => 400,
            _ => 500,
        }
    }

    /// Machine-checkable signal code.
    ///
    /// Both 429 variants carry distinct codes so clients can tell "back off"
    /// from "wait for the window to slide".
    pub fn code(&self) -> &'static str {
        match self {
            HeimdallError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            HeimdallError::TooManyConcurrentRequests { .. } => "too_many_concurrent_requests",
            HeimdallError::RequestTimeout { .. } => "request_timeout",
            HeimdallError::InvalidInput(_) => "invalid_input",
            _ => "internal_error",
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for HeimdallError {
    fn from(err: redis::RedisError) -> Self {
        HeimdallError::Store(err.to_string())
    }
}

/// Returned by best-effort cache writes.
///
/// Deliberately not convertible into [`HeimdallError`]: a failed cache write
/// is a no-op for the caller, so it cannot be `?`-propagated by accident.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cache unavailable: {reason}")]
pub struct CacheUnavailable {
    pub reason: String,
}

impl CacheUnavailable {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;
