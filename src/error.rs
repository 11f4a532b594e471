//! Muninn error types

use std::time::Duration;

/// How the retry layers should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient failure (rate limit, timeout, 5xx). Worth another attempt.
    Retryable,
    /// Permanent failure. Returned to the caller unchanged.
    Fatal,
}

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Cache errors
    /// Call parameters could not be canonicalised into a cache key.
    ///
    /// Never surfaced by the pipeline: the caching layer treats it as a
    /// bypass and forwards the call uncached.
    #[error("serialization error: {0}")]
    Serialization(String),

    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out")]
    Timeout,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Streaming errors
    #[error("stream error: {message}")]
    Stream { message: String, retryable: bool },

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Tool execution errors
    #[error("tool parameters rejected: {0}")]
    ToolValidation(String),

    #[error("tool error: {0}")]
    Tool(String),
}

impl MuninnError {
    /// Whether this error is worth retrying.
    ///
    /// Rate limits (including a bare 429), timeouts, transport failures,
    /// 5xx responses and stream errors flagged retryable by the provider
    /// are transient. Everything else (auth, invalid request, other 4xx,
    /// local errors) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            MuninnError::RateLimited { .. } | MuninnError::Timeout | MuninnError::Http(_) => true,
            MuninnError::Api { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            MuninnError::Stream { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Whether this error is a rate-limit signal from the provider.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            MuninnError::RateLimited { .. } | MuninnError::Api { status: 429, .. }
        )
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MuninnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Default classification used by the retry layers.
    pub fn class(&self) -> ErrorClass {
        if self.is_transient() {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
