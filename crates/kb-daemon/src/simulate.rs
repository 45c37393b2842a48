//! Deterministic timeline replay.
//!
//! Emits `notifications` creation events `spacing` apart, then steps a
//! [`ManualClock`] through `horizon`, polling the dispatcher after every
//! step. Everything runs against the in-memory queue and ingestion service,
//! so the report depends only on the parameters and settings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kb_coordinator::{Coordinator, CoordinatorConfig};
use kb_ingestion::InMemoryIngestionService;
use kb_queue::{BufferingQueue, QueueConfig, QueueDepth};
use kb_scheduler::{DispatchOutcome, Dispatcher, DispatcherConfig};
use kb_types::{ChangeNotification, Clock, ManualClock, Settings};

/// Inputs of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub notifications: usize,
    pub spacing: Duration,
    pub job_duration: Duration,
    pub horizon: Duration,
    /// Clock step between dispatcher polls
    pub tick: Duration,
}

impl SimulationParams {
    pub fn new(notifications: usize, spacing_ms: u64, job_duration_secs: u64, horizon_secs: u64) -> Self {
        Self {
            notifications,
            spacing: Duration::from_millis(spacing_ms),
            job_duration: Duration::from_secs(job_duration_secs),
            horizon: Duration::from_secs(horizon_secs),
            tick: Duration::from_secs(1),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }
}

/// What happened over the simulated horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub notifications: usize,
    pub simulated_secs: u64,
    pub invocations: u64,
    pub jobs_started: u64,
    pub retries_scheduled: u64,
    pub purges: u64,
    pub purged_messages: u64,
    pub failed_invocations: u64,
    pub dead_letters: usize,
    pub max_concurrent_jobs: usize,
    pub jobs_in_progress_at_end: usize,
    pub final_depth: QueueDepth,
}

/// Offset of the `index`-th notification, or `None` past what a
/// `Duration` can represent.
fn emission_offset(spacing: Duration, index: usize) -> Option<Duration> {
    u32::try_from(index)
        .ok()
        .and_then(|i| spacing.checked_mul(i))
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Run one simulation.
pub async fn run_simulation(settings: &Settings, params: &SimulationParams) -> SimulationReport {
    let start = epoch();
    let clock = ManualClock::new(start);
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let target = settings.index.target();

    let queue = Arc::new(BufferingQueue::new(
        QueueConfig::from(&settings.queue),
        shared.clone(),
    ));
    let ingestion = Arc::new(
        InMemoryIngestionService::new(shared.clone()).with_job_duration(params.job_duration),
    );
    let coordinator = Coordinator::new(
        ingestion.clone(),
        queue.clone(),
        ingestion.clone(),
        CoordinatorConfig::from_settings(settings),
    )
    .with_clock(shared.clone());
    let dispatcher = Dispatcher::new(
        queue.clone(),
        coordinator,
        DispatcherConfig::from(&settings.dispatcher),
    )
    .with_clock(shared);

    let at = |offset: Duration| {
        chrono::Duration::from_std(offset)
            .ok()
            .and_then(|d| start.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    };

    let mut sent = 0usize;
    let mut elapsed = Duration::ZERO;
    while elapsed <= params.horizon {
        while sent < params.notifications {
            let Some(offset) = emission_offset(params.spacing, sent) else {
                break;
            };
            if offset > elapsed {
                break;
            }
            let emitted_at = at(offset);
            clock.set(emitted_at);
            let key = format!("simulated/doc-{:05}.md", sent);
            if let Err(e) = queue.send(ChangeNotification::created(key, emitted_at)).await {
                debug!(error = %e, "Dropped simulated notification");
            }
            sent += 1;
        }
        clock.set(at(elapsed));

        loop {
            match dispatcher.dispatch_once().await {
                Ok(DispatchOutcome::Completed(_)) => continue,
                Ok(_) => break,
                Err(e) => {
                    debug!(error = %e, "Simulated receive failed");
                    break;
                }
            }
        }

        elapsed += params.tick;
    }
    queue.prune_dead_letters().await;

    let dispatch = dispatcher.registry().snapshot();
    let queue_stats = queue.stats().await;

    SimulationReport {
        notifications: sent,
        simulated_secs: params.horizon.as_secs(),
        invocations: dispatch.invocations,
        jobs_started: dispatch.jobs_started,
        retries_scheduled: dispatch.retries_scheduled,
        purges: queue_stats.purges,
        purged_messages: queue_stats.purged_messages,
        failed_invocations: dispatch.failures,
        dead_letters: queue_stats.dead_letters,
        max_concurrent_jobs: ingestion.max_concurrent_in_progress().await,
        jobs_in_progress_at_end: ingestion.in_progress_count(&target).await,
        final_depth: queue_stats.depth,
    }
}
