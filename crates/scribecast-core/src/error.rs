//! Error types for `scribecast` core library.

use thiserror::Error;

/// Result type alias using `scribecast` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `scribecast` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid local input, detected before any connection is attempted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
