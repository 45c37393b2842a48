//! Delivered messages and the batches handed to one coordinator invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KbError;
use crate::notification::QueueMessage;

/// Largest batch the buffering queue ever delivers.
pub const MAX_BATCH_SIZE: usize = 10;

/// A message as delivered by the buffering queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    /// Stable id of the underlying message
    pub message_id: String,

    /// Handle for this delivery; a new one is issued on every receive
    pub receipt_handle: String,

    /// How many times the message has been delivered, including this one
    pub receive_count: u32,

    /// When the message was first enqueued
    pub sent_at: DateTime<Utc>,

    /// Message body
    pub body: QueueMessage,
}

/// Ordered, non-empty sequence of at most [`MAX_BATCH_SIZE`] messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationBatch {
    messages: Vec<ReceivedMessage>,
}

impl NotificationBatch {
    /// Build a batch, rejecting empty and oversized input.
    pub fn new(messages: Vec<ReceivedMessage>) -> Result<Self, KbError> {
        if messages.is_empty() {
            return Err(KbError::InvalidInput(
                "notification batch must not be empty".to_string(),
            ));
        }
        if messages.len() > MAX_BATCH_SIZE {
            return Err(KbError::InvalidInput(format!(
                "notification batch holds {} messages, limit is {}",
                messages.len(),
                MAX_BATCH_SIZE
            )));
        }
        Ok(Self { messages })
    }

    pub fn messages(&self) -> &[ReceivedMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true for a constructed batch.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Receipt handles of every message, in delivery order.
    pub fn receipt_handles(&self) -> Vec<String> {
        self.messages
            .iter()
            .map(|m| m.receipt_handle.clone())
            .collect()
    }

    /// Number of retry tokens in the batch.
    pub fn retry_count(&self) -> usize {
        self.messages.iter().filter(|m| m.body.is_retry()).count()
    }

    /// Number of store change notifications in the batch.
    pub fn change_count(&self) -> usize {
        self.len() - self.retry_count()
    }

    /// Highest delivery count in the batch.
    pub fn max_receive_count(&self) -> u32 {
        self.messages
            .iter()
            .map(|m| m.receive_count)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{ChangeNotification, RetryToken};

    fn received(i: usize, body: QueueMessage) -> ReceivedMessage {
        ReceivedMessage {
            message_id: format!("msg-{}", i),
            receipt_handle: format!("rh-{}", i),
            receive_count: 1,
            sent_at: Utc::now(),
            body,
        }
    }

    fn change(i: usize) -> ReceivedMessage {
        received(
            i,
            ChangeNotification::created(format!("doc-{}.txt", i), Utc::now()).into(),
        )
    }

    #[test]
    fn test_empty_batch_rejected() {
        let result = NotificationBatch::new(Vec::new());
        assert!(matches!(result, Err(KbError::InvalidInput(_))));
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let messages: Vec<_> = (0..MAX_BATCH_SIZE + 1).map(change).collect();
        let result = NotificationBatch::new(messages);
        assert!(matches!(result, Err(KbError::InvalidInput(_))));
    }

    #[test]
    fn test_full_batch_accepted() {
        let messages: Vec<_> = (0..MAX_BATCH_SIZE).map(change).collect();
        let batch = NotificationBatch::new(messages).unwrap();
        assert_eq!(batch.len(), MAX_BATCH_SIZE);
        assert!(!batch.is_empty());
        assert_eq!(batch.receipt_handles()[0], "rh-0");
    }

    #[test]
    fn test_counts_split_changes_and_retries() {
        let mut messages: Vec<_> = (0..3).map(change).collect();
        messages.push(received(3, RetryToken::new(Utc::now()).into()));
        messages[1].receive_count = 4;

        let batch = NotificationBatch::new(messages).unwrap();
        assert_eq!(batch.change_count(), 3);
        assert_eq!(batch.retry_count(), 1);
        assert_eq!(batch.max_receive_count(), 4);
    }
}
