//! Error types for the sync pipeline.
//!
//! One taxonomy is shared across crates: adapters map their library
//! errors (sqlx, reqwest) into these variants at the boundary.

use thiserror::Error;

/// Top-level sync error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration error, fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP transport error (connect, timeout)
    #[error("http error: {0}")]
    Http(String),

    /// Upstream throttling or server-side failure
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider payload did not match the expected shape
    #[error("malformed provider response: {0}")]
    DataShape(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Checks whether a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Http(_) | SyncError::RateLimited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let http_err = SyncError::Http("connection reset".to_string());
        assert!(http_err.is_retryable());

        let throttle_err = SyncError::RateLimited("429".to_string());
        assert!(throttle_err.is_retryable());

        let shape_err = SyncError::DataShape("missing field".to_string());
        assert!(!shape_err.is_retryable());

        let db_err = SyncError::Database("deadlock".to_string());
        assert!(!db_err.is_retryable());
    }
}
