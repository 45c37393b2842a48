//! Maintenance scheduler: a thin lifecycle wrapper over tokio-cron-scheduler.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{SchedulerConfig, SchedulerError};

/// Check a 6-field cron expression (sec min hour day-of-month month day-of-week).
///
/// ```
/// use kb_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 * * * *").is_ok());
/// assert!(validate_cron_expression("hourly").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

/// Runs periodic maintenance jobs until shut down.
///
/// Each job gets a clone of the shutdown token and should return promptly
/// once it is cancelled.
pub struct MaintenanceScheduler {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl MaintenanceScheduler {
    /// Create a stopped scheduler. Fails if the default timezone is unknown.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!("Maintenance scheduler started");
        Ok(())
    }

    /// Cancel running jobs and stop the cron runtime.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        self.shutdown_token.cancel();

        let limit = Duration::from_secs(self.config.shutdown_timeout_secs);
        match tokio::time::timeout(limit, self.scheduler.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Error during scheduler shutdown"),
            Err(_) => warn!(timeout_secs = limit.as_secs(), "Scheduler shutdown timed out"),
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Maintenance scheduler stopped");
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register `job_fn` to run on `cron_expr` in `timezone` (or the default).
    pub async fn add_cron_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        job_fn: F,
    ) -> Result<Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let tz: Tz = match timezone {
            Some(tz) => Self::parse_timezone(tz)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        let job_name = name.to_string();
        let token = self.shutdown_token.clone();

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let name = job_name.clone();
            let token = token.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                if token.is_cancelled() {
                    return;
                }
                let start = std::time::Instant::now();
                job_fn(token).await;
                info!(
                    job = %name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Maintenance job finished"
                );
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Job registered");
        Ok(uuid)
    }

    pub fn parse_timezone(tz: &str) -> Result<Tz, SchedulerError> {
        tz.parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz.to_string()))
    }
}
