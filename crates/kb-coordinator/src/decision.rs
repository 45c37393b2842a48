//! Decision rules, free of side effects.

use kb_queue::QueueDepth;
use kb_types::JobStatus;

/// What an invocation does, given the latest job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A job is running: defer with a retry token.
    ScheduleRetry,
    /// Nothing is running: start a new job.
    StartJob,
}

impl Decision {
    /// `None` means no job ever ran for the index.
    pub fn for_status(status: Option<JobStatus>) -> Self {
        match status {
            Some(status) if status.is_in_progress() => Decision::ScheduleRetry,
            _ => Decision::StartJob,
        }
    }
}

/// Whether a purge is worth attempting before a start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePlan {
    /// Undelivered messages exist; the upcoming full scan covers them all.
    Purge,
    /// Nothing to purge.
    Skip,
}

impl PurgePlan {
    pub fn for_depth(depth: &QueueDepth) -> Self {
        if depth.pending() > 0 {
            PurgePlan::Purge
        } else {
            PurgePlan::Skip
        }
    }
}
