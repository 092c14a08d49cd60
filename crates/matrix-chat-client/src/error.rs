//! Error types for Matrix client operations.

use thiserror::Error;

/// Error type for all Matrix client operations.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The homeserver answered with an error.
    #[error("Matrix error {status} {errcode}: {error}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The standard Matrix error code (e.g. `M_FORBIDDEN`).
        errcode: String,
        /// Human-readable error message.
        error: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An operation was attempted before `login()`.
    #[error("Not logged in")]
    NotLoggedIn,
}

/// Convenience Result type alias for Matrix operations.
pub type MatrixResult<T> = Result<T, MatrixError>;
