//! Error types for identifier computation and key handling.

use thiserror::Error;

/// Result type for identifier operations.
pub type Result<T> = std::result::Result<T, IdentError>;

/// Errors that can occur while computing identifiers or loading keys.
#[derive(Error, Debug)]
pub enum IdentError {
    /// Failed to load, parse, or generate the identifier key.
    #[error("key error: {0}")]
    KeyError(String),

    /// Text is not a well-formed identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// I/O error during key file operations.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error in a key file.
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}
