//! Dead-letter retention sweep.
//!
//! Messages that exhausted their deliveries sit in the queue's dead-letter
//! sink for inspection. This job drops the ones older than the retention
//! period (14 days by default).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use kb_queue::BufferingQueue;
use kb_types::MaintenanceSettings;

use crate::{with_jitter, Jitter, MaintenanceScheduler, SchedulerError};

pub const JOB_NAME: &str = "dead_letter_prune";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterPruneJobConfig {
    /// 6-field cron expression (default: top of every hour)
    pub cron: String,
    /// IANA timezone; `None` uses the scheduler default
    pub timezone: Option<String>,
    pub jitter: Jitter,
}

impl Default for DeadLetterPruneJobConfig {
    fn default() -> Self {
        Self::from(&MaintenanceSettings::default())
    }
}

impl From<&MaintenanceSettings> for DeadLetterPruneJobConfig {
    fn from(settings: &MaintenanceSettings) -> Self {
        Self {
            cron: settings.dead_letter_prune_cron.clone(),
            timezone: Some(settings.timezone.clone()),
            jitter: Jitter::new(settings.jitter_secs),
        }
    }
}

/// Prunes expired dead letters from a [`BufferingQueue`].
#[derive(Debug, Clone)]
pub struct DeadLetterPruneJob {
    queue: Arc<BufferingQueue>,
    config: DeadLetterPruneJobConfig,
}

impl DeadLetterPruneJob {
    pub fn new(queue: Arc<BufferingQueue>, config: DeadLetterPruneJobConfig) -> Self {
        Self { queue, config }
    }

    pub fn config(&self) -> &DeadLetterPruneJobConfig {
        &self.config
    }

    /// One sweep. Returns the number of pruned entries.
    pub async fn run(&self, cancel: CancellationToken) -> usize {
        if cancel.is_cancelled() {
            debug!("Dead-letter prune cancelled before start");
            return 0;
        }
        let removed = self.queue.prune_dead_letters().await;
        info!(removed, "Dead-letter retention sweep complete");
        removed
    }
}

/// Register `job` on its cron schedule, with its jitter applied per run.
pub async fn register_dead_letter_prune_job(
    scheduler: &MaintenanceScheduler,
    job: DeadLetterPruneJob,
) -> Result<Uuid, SchedulerError> {
    let config = job.config().clone();
    let job = Arc::new(job);

    scheduler
        .add_cron_job(
            JOB_NAME,
            &config.cron,
            config.timezone.as_deref(),
            move |token| {
                let job = job.clone();
                let jitter = config.jitter;
                async move {
                    with_jitter(jitter, job.run(token)).await;
                }
            },
        )
        .await
}
