//! Error types for queue operations.

use kb_types::KbError;
use thiserror::Error;

/// Errors returned by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A purge ran too recently
    #[error("Purge rejected: cooldown active for another {retry_after_secs}s")]
    PurgeCooldown { retry_after_secs: u64 },

    /// Requested delivery delay is larger than the queue allows
    #[error("Invalid delay: {requested_secs}s exceeds maximum of {max_secs}s")]
    InvalidDelay { requested_secs: u64, max_secs: u64 },

    /// The queue could not be reached
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// A delivered batch violated batch invariants
    #[error("Batch error: {0}")]
    Batch(#[from] KbError),
}

impl QueueError {
    /// Whether the failure is a purge cooldown rejection.
    pub fn is_cooldown(&self) -> bool {
        matches!(self, QueueError::PurgeCooldown { .. })
    }
}
