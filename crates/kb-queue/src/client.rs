//! Queue capabilities consumed by the coordinator and the host loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kb_types::{NotificationBatch, QueueMessage};

use crate::QueueError;

/// Snapshot of how many messages the queue holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    /// Deliverable now
    pub visible: u64,
    /// Enqueued with a delay that has not elapsed yet
    pub delayed: u64,
    /// Delivered and neither acknowledged nor visible again
    pub in_flight: u64,
}

impl QueueDepth {
    /// Messages not yet delivered: visible plus delayed.
    pub fn pending(&self) -> u64 {
        self.visible + self.delayed
    }
}

/// Queue operations the coordinator performs.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Enqueue a message that becomes deliverable after `delay`.
    async fn send_delayed(
        &self,
        message: QueueMessage,
        delay: Duration,
    ) -> Result<String, QueueError>;

    /// Current depth of the queue.
    async fn depth(&self) -> Result<QueueDepth, QueueError>;

    /// Remove every message not currently in flight.
    ///
    /// Returns the number of removed messages. Subject to a cooldown.
    async fn purge(&self) -> Result<u64, QueueError>;

    /// Delete every message of a successfully handled batch.
    async fn acknowledge(&self, batch: &NotificationBatch) -> Result<(), QueueError>;
}

/// Queue operations the host loop performs.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Next debounced batch, or `None` if nothing is ready.
    async fn receive_batch(&self) -> Result<Option<NotificationBatch>, QueueError>;

    /// Hand a failed batch back for redelivery.
    async fn release(&self, batch: &NotificationBatch) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: QueueClient + ?Sized> QueueClient for Arc<T> {
    async fn send_delayed(
        &self,
        message: QueueMessage,
        delay: Duration,
    ) -> Result<String, QueueError> {
        (**self).send_delayed(message, delay).await
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        (**self).depth().await
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        (**self).purge().await
    }

    async fn acknowledge(&self, batch: &NotificationBatch) -> Result<(), QueueError> {
        (**self).acknowledge(batch).await
    }
}

#[async_trait]
impl<T: QueueConsumer + ?Sized> QueueConsumer for Arc<T> {
    async fn receive_batch(&self) -> Result<Option<NotificationBatch>, QueueError> {
        (**self).receive_batch().await
    }

    async fn release(&self, batch: &NotificationBatch) -> Result<(), QueueError> {
        (**self).release(batch).await
    }
}
