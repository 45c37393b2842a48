//! Error types for coordinator invocations.
//!
//! Every variant fails the invocation: the batch is left unacknowledged and
//! the queue redelivers it. Purge failures never surface here.

use kb_ingestion::IngestionError;
use kb_queue::QueueError;
use thiserror::Error;

/// Errors that fail a coordinator invocation.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Reading the latest job status failed
    #[error("Failed to query ingestion job status: {0}")]
    StatusQuery(#[source] IngestionError),

    /// Starting a new job failed
    #[error("Failed to start ingestion job: {0}")]
    StartJob(#[source] IngestionError),

    /// Enqueueing the retry token failed
    #[error("Failed to schedule retry: {0}")]
    ScheduleRetry(#[source] QueueError),

    /// Deleting the handled batch failed
    #[error("Failed to acknowledge batch: {0}")]
    Acknowledge(#[source] QueueError),
}
