//! Change notifications and the messages carried by the buffering queue.
//!
//! Notifications are fungible: the coordinator only cares that *something*
//! changed, never which object or how. The key and kind are kept for logs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of store change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Object uploaded or overwritten
    Created,
    /// Object removed
    Deleted,
}

impl ChangeKind {
    /// Map a store event name onto a change kind.
    ///
    /// Accepts both the `ObjectCreated:Put` / `ObjectRemoved:Delete` style and
    /// the `Object Created` / `Object Deleted` detail-type style.
    pub fn from_event_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        if normalized.starts_with("objectcreated") {
            Some(ChangeKind::Created)
        } else if normalized.starts_with("objectremoved") || normalized.starts_with("objectdeleted")
        {
            Some(ChangeKind::Deleted)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One object-created / object-deleted occurrence in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Key of the object that changed
    pub object_key: String,

    /// What happened to it
    pub kind: ChangeKind,

    /// When the store emitted the event
    pub timestamp: DateTime<Utc>,
}

impl ChangeNotification {
    pub fn new(object_key: impl Into<String>, kind: ChangeKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            object_key: object_key.into(),
            kind,
            timestamp,
        }
    }

    pub fn created(object_key: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(object_key, ChangeKind::Created, timestamp)
    }

    pub fn deleted(object_key: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(object_key, ChangeKind::Deleted, timestamp)
    }
}

/// Self-scheduled "re-check later" marker.
///
/// Enqueued with a delay when a job is already running; consumed by a later
/// invocation exactly like a change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryToken {
    /// When the coordinator observed the in-progress job
    pub issued_at: DateTime<Utc>,
}

impl RetryToken {
    pub fn new(issued_at: DateTime<Utc>) -> Self {
        Self { issued_at }
    }
}

/// Body of a buffering-queue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueMessage {
    /// A store change
    Change(ChangeNotification),
    /// A coordinator retry token
    Retry(RetryToken),
}

impl QueueMessage {
    pub fn is_retry(&self) -> bool {
        matches!(self, QueueMessage::Retry(_))
    }

    /// Short label for logging.
    pub fn describe(&self) -> String {
        match self {
            QueueMessage::Change(n) => format!("{} {}", n.kind, n.object_key),
            QueueMessage::Retry(_) => "retry-token".to_string(),
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<ChangeNotification> for QueueMessage {
    fn from(notification: ChangeNotification) -> Self {
        QueueMessage::Change(notification)
    }
}

impl From<RetryToken> for QueueMessage {
    fn from(token: RetryToken) -> Self {
        QueueMessage::Retry(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_from_event_name() {
        assert_eq!(
            ChangeKind::from_event_name("ObjectCreated:Put"),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            ChangeKind::from_event_name("ObjectRemoved:Delete"),
            Some(ChangeKind::Deleted)
        );
        assert_eq!(
            ChangeKind::from_event_name("Object Created"),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            ChangeKind::from_event_name("Object Deleted"),
            Some(ChangeKind::Deleted)
        );
        assert_eq!(ChangeKind::from_event_name("ObjectRestore:Post"), None);
        assert_eq!(ChangeKind::from_event_name(""), None);
    }

    #[test]
    fn test_queue_message_json_is_tagged() {
        let msg = QueueMessage::from(ChangeNotification::created("docs/a.pdf", Utc::now()));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"change\""));
        assert!(json.contains("\"kind\":\"created\""));

        let retry = QueueMessage::from(RetryToken::new(Utc::now()));
        let json = serde_json::to_string(&retry).unwrap();
        assert!(json.contains("\"type\":\"retry\""));
    }

    #[test]
    fn test_queue_message_bytes() {
        let msg = QueueMessage::from(ChangeNotification::deleted("docs/b.md", Utc::now()));
        let decoded = QueueMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(msg, decoded);
        assert!(!decoded.is_retry());
        assert_eq!(decoded.describe(), "deleted docs/b.md");
    }
}
