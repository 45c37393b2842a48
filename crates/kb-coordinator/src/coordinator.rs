//! The coordinator invocation handler.

use std::sync::Arc;

use tracing::{debug, info, warn};

use kb_ingestion::{JobStarter, JobStatusSource};
use kb_queue::QueueClient;
use kb_types::{Clock, IngestionJob, NotificationBatch, RetryToken, SystemClock};

use crate::{
    Action, CoordinatorConfig, CoordinatorError, Decision, InvocationOutcome, PurgeOutcome,
    PurgePlan,
};

/// Decides, per batch, whether to start a re-indexing job or defer.
///
/// Collaborators are injected so the handler can run against the in-memory
/// queue and service, a real deployment, or test doubles:
///
/// - `S`: reads the latest job status
/// - `Q`: enqueues retry tokens, reads depth, purges, acknowledges
/// - `J`: starts jobs
pub struct Coordinator<S, Q, J> {
    status_source: S,
    queue: Q,
    starter: J,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
}

impl<S, Q, J> Coordinator<S, Q, J>
where
    S: JobStatusSource,
    Q: QueueClient,
    J: JobStarter,
{
    pub fn new(status_source: S, queue: Q, starter: J, config: CoordinatorConfig) -> Self {
        Self {
            status_source,
            queue,
            starter,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` to timestamp retry tokens.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Handle one batch.
    ///
    /// On `Ok` the batch has been acknowledged. On `Err` it has not, and the
    /// caller should hand it back to the queue for redelivery.
    pub async fn handle_batch(
        &self,
        batch: &NotificationBatch,
    ) -> Result<InvocationOutcome, CoordinatorError> {
        let target = &self.config.target;
        debug!(
            target = %target,
            size = batch.len(),
            changes = batch.change_count(),
            retries = batch.retry_count(),
            "Handling notification batch"
        );

        let latest = self
            .status_source
            .latest_job(target)
            .await
            .map_err(CoordinatorError::StatusQuery)?;

        let outcome = match Decision::for_status(latest.as_ref().map(|job| job.status)) {
            Decision::ScheduleRetry => self.defer(batch, latest).await?,
            Decision::StartJob => self.start(batch).await?,
        };

        info!(
            target = %target,
            action = ?outcome.action,
            job_id = outcome.job_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            status = %outcome.status,
            purge = ?outcome.purge,
            batch_size = outcome.batch_size,
            "Coordinator invocation complete"
        );
        Ok(outcome)
    }

    /// A job is running: one retry token for the whole batch, then acknowledge.
    ///
    /// Dropping the batch is safe because the next job re-scans the whole
    /// store, including whatever these notifications described.
    async fn defer(
        &self,
        batch: &NotificationBatch,
        running: Option<IngestionJob>,
    ) -> Result<InvocationOutcome, CoordinatorError> {
        let status = running.as_ref().map(|job| job.status).unwrap_or_default();
        if let Some(job) = &running {
            info!(job_id = %job.job_id, "Ingestion job in progress, scheduling retry");
        }

        let token = RetryToken::new(self.clock.now());
        let retry_message_id = self
            .queue
            .send_delayed(token.into(), self.config.retry_delay)
            .await
            .map_err(CoordinatorError::ScheduleRetry)?;

        self.queue
            .acknowledge(batch)
            .await
            .map_err(CoordinatorError::Acknowledge)?;

        Ok(InvocationOutcome {
            action: Action::RetryScheduled,
            job_id: None,
            status,
            purge: PurgeOutcome::NotAttempted,
            retry_message_id: Some(retry_message_id),
            batch_size: batch.len(),
        })
    }

    /// Nothing is running: best-effort purge, start a job, acknowledge.
    async fn start(&self, batch: &NotificationBatch) -> Result<InvocationOutcome, CoordinatorError> {
        let purge = self.purge_redundant().await;

        let job = self
            .starter
            .start_job(&self.config.target)
            .await
            .map_err(CoordinatorError::StartJob)?;
        info!(job_id = %job.job_id, status = %job.status, "Started ingestion job");

        self.queue
            .acknowledge(batch)
            .await
            .map_err(CoordinatorError::Acknowledge)?;

        Ok(InvocationOutcome {
            action: Action::Started,
            job_id: Some(job.job_id),
            status: job.status,
            purge,
            retry_message_id: None,
            batch_size: batch.len(),
        })
    }

    /// Drop queued messages made redundant by the job about to start.
    ///
    /// Never fails: depth and purge errors are logged and reported in the
    /// outcome, and the caller proceeds to start the job regardless.
    async fn purge_redundant(&self) -> PurgeOutcome {
        let depth = match self.queue.depth().await {
            Ok(depth) => depth,
            Err(e) => {
                warn!(error = %e, "Failed to read queue depth, skipping purge");
                return PurgeOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        match PurgePlan::for_depth(&depth) {
            PurgePlan::Skip => {
                debug!("Queue holds no undelivered messages, skipping purge");
                PurgeOutcome::Skipped
            }
            PurgePlan::Purge => match self.queue.purge().await {
                Ok(removed) => {
                    info!(
                        visible = depth.visible,
                        delayed = depth.delayed,
                        removed,
                        "Purged redundant queue messages"
                    );
                    PurgeOutcome::Purged { removed }
                }
                Err(e) => {
                    warn!(error = %e, "Queue purge failed, starting job anyway");
                    PurgeOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
        }
    }
}
