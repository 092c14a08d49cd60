//! Error types for the sync engine.

use thiserror::Error;

/// Error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A call to the remote service failed.
    #[error("Remote service error: {0}")]
    Remote(#[from] hostex_api_client::HostexError),

    /// A call to the chat network failed.
    #[error("Chat network error: {0}")]
    Chat(#[from] matrix_chat_client::MatrixError),

    /// A persistence operation failed.
    #[error("Database error: {0}")]
    Database(#[from] bridge_database::DatabaseError),

    /// A lifecycle operation was attempted in the wrong state.
    #[error("Bridge is {actual}, expected {expected}")]
    State {
        /// The state the operation requires.
        expected: &'static str,
        /// The state the bridge was actually in.
        actual: &'static str,
    },
}

/// Convenience Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_error_display() {
        let err = EngineError::State {
            expected: "created",
            actual: "running",
        };
        assert_eq!(format!("{err}"), "Bridge is running, expected created");
    }
}
