//! Capabilities the coordinator uses to talk to the ingestion service.

use std::sync::Arc;

use async_trait::async_trait;

use kb_types::{IndexTarget, IngestionJob};

use crate::IngestionError;

/// Reads job state.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    /// Most recent job for `target`, or `None` if no job ever ran.
    async fn latest_job(&self, target: &IndexTarget)
        -> Result<Option<IngestionJob>, IngestionError>;
}

/// Starts full re-indexing jobs.
#[async_trait]
pub trait JobStarter: Send + Sync {
    /// Begin a full scan of the store for `target`.
    ///
    /// Returns the new job as accepted by the service.
    async fn start_job(&self, target: &IndexTarget) -> Result<IngestionJob, IngestionError>;
}

#[async_trait]
impl<T: JobStatusSource + ?Sized> JobStatusSource for Arc<T> {
    async fn latest_job(
        &self,
        target: &IndexTarget,
    ) -> Result<Option<IngestionJob>, IngestionError> {
        (**self).latest_job(target).await
    }
}

#[async_trait]
impl<T: JobStarter + ?Sized> JobStarter for Arc<T> {
    async fn start_job(&self, target: &IndexTarget) -> Result<IngestionJob, IngestionError> {
        (**self).start_job(target).await
    }
}
