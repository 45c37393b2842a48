//! Dead-letter sink entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kb_types::QueueMessage;

/// A message that exhausted its deliveries.
///
/// The body is kept exactly as it was enqueued. Entries are never
/// reprocessed automatically; they exist for operators to inspect until the
/// retention period runs out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message_id: String,
    pub body: QueueMessage,
    pub sent_at: DateTime<Utc>,
    pub receive_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Whether the entry has outlived `retention` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
        now - self.dead_lettered_at >= retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_types::ChangeNotification;

    #[test]
    fn test_expiry() {
        let at = Utc::now();
        let letter = DeadLetter {
            message_id: "m-1".to_string(),
            body: ChangeNotification::created("a.txt", at).into(),
            sent_at: at,
            receive_count: 10,
            dead_lettered_at: at,
        };
        let retention = chrono::Duration::days(14);

        assert!(!letter.is_expired(at + chrono::Duration::days(13), retention));
        assert!(letter.is_expired(at + chrono::Duration::days(14), retention));
    }
}
