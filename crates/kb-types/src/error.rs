//! Error types for the kb-sync system.

use thiserror::Error;

/// Unified error type for shared kb-sync operations.
#[derive(Debug, Error)]
pub enum KbError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
