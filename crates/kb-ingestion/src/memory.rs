//! In-memory ingestion service.
//!
//! Jobs start IN_PROGRESS and, when a job duration is configured, read as
//! COMPLETE once that much clock time has passed. Operators (and tests) can
//! also finish, fail or stop the active job by hand, or take the whole
//! service offline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use kb_types::{Clock, IndexTarget, IngestionJob, JobStatus, SystemClock};

use crate::{IngestionError, JobStarter, JobStatusSource};

/// Finished jobs kept per target by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Default)]
struct ServiceState {
    /// Started jobs, oldest first; finished ones are trimmed per target
    jobs: Vec<IngestionJob>,
    unavailable: bool,
    start_calls: u64,
    status_calls: u64,
    /// Highest number of jobs seen IN_PROGRESS for one target at once
    max_concurrent: usize,
}

impl ServiceState {
    fn refresh(&mut self, now: DateTime<Utc>, job_duration: Option<chrono::Duration>) {
        let Some(duration) = job_duration else {
            return;
        };
        for job in self.jobs.iter_mut() {
            if job.status.is_in_progress() && now - job.started_at >= duration {
                job.status = JobStatus::Complete;
                job.updated_at = job.started_at + duration;
                debug!(job_id = %job.job_id, "Ingestion job completed");
            }
        }
    }

    fn in_progress(&self, target: &IndexTarget) -> usize {
        self.jobs
            .iter()
            .filter(|j| &j.target == target && j.status.is_in_progress())
            .count()
    }

    /// Drop the oldest finished jobs of `target` beyond `limit`. Running
    /// jobs and the latest job are always kept.
    fn trim_history(&mut self, target: &IndexTarget, limit: usize) {
        let finished = self
            .jobs
            .iter()
            .filter(|j| &j.target == target && !j.status.is_in_progress())
            .count();
        let mut excess = finished.saturating_sub(limit.max(1));
        if excess == 0 {
            return;
        }
        self.jobs.retain(|j| {
            if excess > 0 && &j.target == target && !j.status.is_in_progress() {
                excess -= 1;
                false
            } else {
                true
            }
        });
        debug!(target = %target, "Trimmed finished job history");
    }

    fn latest_mut(&mut self, target: &IndexTarget) -> Option<&mut IngestionJob> {
        self.jobs.iter_mut().rev().find(|j| &j.target == target)
    }
}

/// Ingestion service kept entirely in memory.
#[derive(Debug)]
pub struct InMemoryIngestionService {
    clock: Arc<dyn Clock>,
    job_duration: Option<chrono::Duration>,
    history_limit: usize,
    state: Mutex<ServiceState>,
}

impl InMemoryIngestionService {
    /// Create a service whose jobs run until finished by hand.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            job_duration: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// Create a service on the system clock.
    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Jobs complete on their own after `duration` of clock time.
    pub fn with_job_duration(mut self, duration: Duration) -> Self {
        self.job_duration =
            Some(chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX));
        self
    }

    /// Keep at most `limit` finished jobs per target (at least one).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Make every call fail with [`IngestionError::Unavailable`].
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Mark the latest job for `target` COMPLETE. Returns false if none is running.
    pub async fn complete_active(&self, target: &IndexTarget) -> bool {
        self.finish_active(target, JobStatus::Complete).await
    }

    /// Mark the latest job for `target` FAILED. Returns false if none is running.
    pub async fn fail_active(&self, target: &IndexTarget) -> bool {
        self.finish_active(target, JobStatus::Failed).await
    }

    /// Mark the latest job for `target` STOPPED. Returns false if none is running.
    pub async fn stop_active(&self, target: &IndexTarget) -> bool {
        self.finish_active(target, JobStatus::Stopped).await
    }

    async fn finish_active(&self, target: &IndexTarget, status: JobStatus) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.refresh(now, self.job_duration);

        match state.latest_mut(target) {
            Some(job) if job.status.is_in_progress() => {
                job.status = status;
                job.updated_at = now;
                info!(job_id = %job.job_id, status = %status, "Ingestion job finished");
                true
            }
            _ => false,
        }
    }

    /// All jobs for `target`, oldest first, with statuses as of now.
    pub async fn jobs(&self, target: &IndexTarget) -> Vec<IngestionJob> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.refresh(now, self.job_duration);
        state
            .jobs
            .iter()
            .filter(|j| &j.target == target)
            .cloned()
            .collect()
    }

    /// Jobs for `target` currently IN_PROGRESS.
    pub async fn in_progress_count(&self, target: &IndexTarget) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.refresh(now, self.job_duration);
        state.in_progress(target)
    }

    /// Number of start requests accepted.
    pub async fn start_count(&self) -> u64 {
        self.state.lock().await.start_calls
    }

    /// Number of status reads served.
    pub async fn status_count(&self) -> u64 {
        self.state.lock().await.status_calls
    }

    /// Highest number of simultaneously IN_PROGRESS jobs for a single target.
    pub async fn max_concurrent_in_progress(&self) -> usize {
        self.state.lock().await.max_concurrent
    }
}

#[async_trait]
impl JobStatusSource for InMemoryIngestionService {
    async fn latest_job(
        &self,
        target: &IndexTarget,
    ) -> Result<Option<IngestionJob>, IngestionError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(IngestionError::Unavailable(
                "status endpoint offline".to_string(),
            ));
        }
        state.refresh(now, self.job_duration);
        state.status_calls += 1;

        Ok(state.latest_mut(target).cloned())
    }
}

#[async_trait]
impl JobStarter for InMemoryIngestionService {
    async fn start_job(&self, target: &IndexTarget) -> Result<IngestionJob, IngestionError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(IngestionError::Unavailable(
                "start endpoint offline".to_string(),
            ));
        }
        state.refresh(now, self.job_duration);

        let job = IngestionJob::started(target.clone(), now);
        state.jobs.push(job.clone());
        state.start_calls += 1;
        state.trim_history(target, self.history_limit);

        let running = state.in_progress(target);
        state.max_concurrent = state.max_concurrent.max(running);

        info!(job_id = %job.job_id, target = %target, running, "Ingestion job started");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_types::ManualClock;

    fn target() -> IndexTarget {
        IndexTarget::new("KB1", "DS1")
    }

    fn service(clock: &ManualClock) -> InMemoryIngestionService {
        InMemoryIngestionService::new(Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_no_job_initially() {
        let clock = ManualClock::starting_now();
        let svc = service(&clock);
        assert!(svc.latest_job(&target()).await.unwrap().is_none());
        assert_eq!(svc.status_count().await, 1);
    }

    #[tokio::test]
    async fn test_start_reports_in_progress() {
        let clock = ManualClock::starting_now();
        let svc = service(&clock);

        let job = svc.start_job(&target()).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);

        let latest = svc.latest_job(&target()).await.unwrap().unwrap();
        assert_eq!(latest.job_id, job.job_id);
        assert!(latest.status.is_in_progress());
        assert_eq!(svc.start_count().await, 1);
    }

    #[tokio::test]
    async fn test_job_duration_completes_job() {
        let clock = ManualClock::starting_now();
        let svc = service(&clock).with_job_duration(Duration::from_secs(120));

        svc.start_job(&target()).await.unwrap();
        clock.advance(Duration::from_secs(119));
        assert_eq!(svc.in_progress_count(&target()).await, 1);

        clock.advance(Duration::from_secs(1));
        let latest = svc.latest_job(&target()).await.unwrap().unwrap();
        assert_eq!(latest.status, JobStatus::Complete);
        assert_eq!(svc.in_progress_count(&target()).await, 0);
    }

    #[tokio::test]
    async fn test_manual_finish() {
        let clock = ManualClock::starting_now();
        let svc = service(&clock);

        assert!(!svc.complete_active(&target()).await);

        svc.start_job(&target()).await.unwrap();
        assert!(svc.fail_active(&target()).await);
        let latest = svc.latest_job(&target()).await.unwrap().unwrap();
        assert_eq!(latest.status, JobStatus::Failed);

        svc.start_job(&target()).await.unwrap();
        assert!(svc.stop_active(&target()).await);
        assert_eq!(svc.jobs(&target()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_starts_are_not_rejected_but_tracked() {
        let clock = ManualClock::starting_now();
        let svc = service(&clock);

        svc.start_job(&target()).await.unwrap();
        svc.start_job(&target()).await.unwrap();

        assert_eq!(svc.in_progress_count(&target()).await, 2);
        assert_eq!(svc.max_concurrent_in_progress().await, 2);
    }

    #[tokio::test]
    async fn test_targets_are_independent() {
        let clock = ManualClock::starting_now();
        let svc = service(&clock);
        let other = IndexTarget::new("KB2", "DS1");

        svc.start_job(&target()).await.unwrap();
        svc.start_job(&other).await.unwrap();

        assert_eq!(svc.max_concurrent_in_progress().await, 1);
        assert!(svc.latest_job(&IndexTarget::new("KB3", "DS1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finished_history_is_capped_per_target() {
        let clock = ManualClock::starting_now();
        let svc = service(&clock)
            .with_job_duration(Duration::from_secs(10))
            .with_history_limit(3);
        let other = IndexTarget::new("KB2", "DS1");

        svc.start_job(&other).await.unwrap();
        for _ in 0..20 {
            svc.start_job(&target()).await.unwrap();
            clock.advance(Duration::from_secs(11));
        }
        let running = svc.start_job(&target()).await.unwrap();

        let jobs = svc.jobs(&target()).await;
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs.last().unwrap().job_id, running.job_id);
        assert!(jobs.last().unwrap().status.is_in_progress());
        assert_eq!(svc.jobs(&other).await.len(), 1);
        assert_eq!(svc.start_count().await, 22);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let clock = ManualClock::starting_now();
        let svc = service(&clock);
        svc.set_unavailable(true).await;

        assert!(matches!(
            svc.latest_job(&target()).await,
            Err(IngestionError::Unavailable(_))
        ));
        assert!(matches!(
            svc.start_job(&target()).await,
            Err(IngestionError::Unavailable(_))
        ));
        assert_eq!(svc.start_count().await, 0);

        svc.set_unavailable(false).await;
        assert!(svc.start_job(&target()).await.is_ok());
    }
}
