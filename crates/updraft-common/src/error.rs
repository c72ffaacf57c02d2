//! Error types shared across Updraft subsystems.

use thiserror::Error;

/// Top-level error type for Updraft operations.
#[derive(Debug, Error)]
pub enum UpdraftError {
    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Save-format version mismatch
    #[error("Save version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: u32,
        /// Actual version found
        actual: u32,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for Updraft operations.
pub type UpdraftResult<T> = Result<T, UpdraftError>;
