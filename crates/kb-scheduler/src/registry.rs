//! Dispatch registry: what the host loop has done so far.
//!
//! Every poll of the dispatcher ends up here, whether it delivered nothing,
//! was turned away by the single-flight gate, or ran the coordinator.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kb_coordinator::{Action, InvocationOutcome, PurgeOutcome};

/// Snapshot of dispatcher activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Batches handed to the coordinator
    pub invocations: u64,
    pub jobs_started: u64,
    pub retries_scheduled: u64,
    /// Purges that succeeded, including ones that removed nothing
    pub purges: u64,
    pub purge_failures: u64,
    /// Invocations that returned an error or timed out
    pub failures: u64,
    pub timeouts: u64,
    /// Polls refused because an invocation was already active
    pub skipped_polls: u64,
    /// Polls that found nothing deliverable
    pub empty_polls: u64,
    pub last_outcome: Option<InvocationOutcome>,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// Thread-safe dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    stats: RwLock<DispatchStats>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut DispatchStats)) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }

    pub fn record_skipped(&self) {
        self.update(|s| s.skipped_polls += 1);
    }

    pub fn record_empty(&self) {
        self.update(|s| s.empty_polls += 1);
    }

    /// Record a completed invocation.
    pub fn record_success(&self, outcome: &InvocationOutcome, duration_ms: u64, at: DateTime<Utc>) {
        self.update(|s| {
            s.invocations += 1;
            match outcome.action {
                Action::Started => s.jobs_started += 1,
                Action::RetryScheduled => s.retries_scheduled += 1,
            }
            match outcome.purge {
                PurgeOutcome::Purged { .. } => s.purges += 1,
                PurgeOutcome::Failed { .. } => s.purge_failures += 1,
                PurgeOutcome::NotAttempted | PurgeOutcome::Skipped => {}
            }
            s.last_outcome = Some(outcome.clone());
            s.last_error = None;
            s.last_duration_ms = Some(duration_ms);
            s.last_dispatch_at = Some(at);
        });
    }

    /// Record a failed or timed-out invocation.
    pub fn record_failure(&self, error: String, timed_out: bool, duration_ms: u64, at: DateTime<Utc>) {
        self.update(|s| {
            s.invocations += 1;
            s.failures += 1;
            if timed_out {
                s.timeouts += 1;
            }
            s.last_outcome = None;
            s.last_error = Some(error);
            s.last_duration_ms = Some(duration_ms);
            s.last_dispatch_at = Some(at);
        });
    }

    pub fn snapshot(&self) -> DispatchStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
