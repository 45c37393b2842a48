//! Invocation results.

use serde::{Deserialize, Serialize};

use kb_types::{JobId, JobStatus};

/// What the invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Started,
    RetryScheduled,
}

/// Result of the best-effort purge step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PurgeOutcome {
    /// A job was running, so the purge step never ran
    NotAttempted,
    /// Queue held nothing undelivered
    Skipped,
    Purged { removed: u64 },
    /// Purge (or the depth read before it) failed; the job was started anyway
    Failed { reason: String },
}

/// Observability record of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    pub action: Action,

    /// Set when a job was started
    pub job_id: Option<JobId>,

    /// New job's initial status, or the observed in-progress status
    pub status: JobStatus,

    pub purge: PurgeOutcome,

    /// Message id of the retry token, when one was scheduled
    pub retry_message_id: Option<String>,

    /// Messages acknowledged with the batch
    pub batch_size: usize,
}

impl InvocationOutcome {
    pub fn started(&self) -> bool {
        self.action == Action::Started
    }
}
