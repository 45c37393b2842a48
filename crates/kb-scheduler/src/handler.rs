//! The seam between the dispatcher and whatever handles a batch.

use async_trait::async_trait;

use kb_coordinator::{Coordinator, CoordinatorError, InvocationOutcome};
use kb_ingestion::{JobStarter, JobStatusSource};
use kb_queue::QueueClient;
use kb_types::NotificationBatch;

/// Handles one delivered batch.
///
/// `Ok` means the batch was acknowledged; `Err` means it must be released
/// for redelivery.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: &NotificationBatch)
        -> Result<InvocationOutcome, CoordinatorError>;
}

#[async_trait]
impl<S, Q, J> BatchHandler for Coordinator<S, Q, J>
where
    S: JobStatusSource,
    Q: QueueClient,
    J: JobStarter,
{
    async fn handle(
        &self,
        batch: &NotificationBatch,
    ) -> Result<InvocationOutcome, CoordinatorError> {
        self.handle_batch(batch).await
    }
}

#[async_trait]
impl<T: BatchHandler + ?Sized> BatchHandler for std::sync::Arc<T> {
    async fn handle(
        &self,
        batch: &NotificationBatch,
    ) -> Result<InvocationOutcome, CoordinatorError> {
        (**self).handle(batch).await
    }
}
