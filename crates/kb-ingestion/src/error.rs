//! Error types for ingestion service calls.

use thiserror::Error;

/// Errors returned by the ingestion service.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The service could not be reached or returned a server error
    #[error("Ingestion service unavailable: {0}")]
    Unavailable(String),

    /// The service rejected the call due to rate limiting
    #[error("Ingestion service throttled: {0}")]
    Throttled(String),
}
