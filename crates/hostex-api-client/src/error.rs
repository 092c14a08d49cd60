//! Error types for Hostex API operations.

use thiserror::Error;

/// Error type for all Hostex API operations.
#[derive(Debug, Error)]
pub enum HostexError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success HTTP status.
    #[error("Hostex request failed: {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The API envelope carried a non-200 error code.
    #[error("Hostex API error {code}: {message}")]
    Api {
        /// The in-body error code.
        code: i64,
        /// The service's error message.
        message: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type alias for Hostex operations.
pub type HostexResult<T> = Result<T, HostexError>;
