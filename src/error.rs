//! Mimir error types

use std::time::Duration;

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Configuration errors
    /// Missing credential or invalid settings. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    // Upstream errors
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The request exceeded a hard transport or quota limit.
    ///
    /// Retrying the same content cannot succeed, so the chunk is marked
    /// failed and excluded from the merge.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Success status, but the expected content was missing or unusable.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Connection, timeout, or body-read failure.
    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    // Aggregate errors
    #[error("all {chunks} chunks failed, last error: {last_error}")]
    AllChunksFailed { chunks: usize, last_error: String },

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MimirError {
    /// Whether this error is worth retrying against the same upstream.
    ///
    /// Rate limits, network failures, malformed responses and non-success
    /// statuses other than "payload too large" are transient. Configuration
    /// errors and oversized payloads are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MimirError::RateLimited { .. }
                | MimirError::MalformedResponse(_)
                | MimirError::TransientNetwork(_)
                | MimirError::Api { .. }
        )
    }

    /// Upstream `Retry-After` hint, if the error carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MimirError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify an upstream error message that arrived without a usable
    /// HTTP status (e.g. an error object inside a 200 body).
    pub(crate) fn from_upstream_message(status: u16, message: String) -> Self {
        let lower = message.to_lowercase();
        if status == 429
            || lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("resource_exhausted")
            || lower.contains("quota")
        {
            MimirError::RateLimited { retry_after: None }
        } else if status == 413 || lower.contains("too large") {
            MimirError::PayloadTooLarge(message)
        } else {
            MimirError::Api { status, message }
        }
    }
}

impl From<reqwest::Error> for MimirError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MimirError::MalformedResponse(err.to_string())
        } else {
            MimirError::TransientNetwork(err.to_string())
        }
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
