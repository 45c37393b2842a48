//! End-to-end test infrastructure for kb-sync.
//!
//! [`TestHarness`] assembles the whole pipeline (buffering queue, ingestion
//! service, coordinator, dispatcher) on one [`ManualClock`], so tests can
//! replay timelines deterministically. Coordinator-side calls go through
//! [`Recorded`] wrappers that log every call in order.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use kb_coordinator::{Coordinator, CoordinatorConfig, InvocationOutcome};
use kb_ingestion::{InMemoryIngestionService, IngestionError, JobStarter, JobStatusSource};
use kb_queue::{BufferingQueue, QueueClient, QueueConfig, QueueDepth, QueueError};
use kb_scheduler::{DispatchOutcome, DispatchStats, Dispatcher, DispatcherConfig};
use kb_types::{
    ChangeNotification, Clock, IndexTarget, IngestionJob, ManualClock, NotificationBatch,
    QueueMessage,
};

/// One collaborator call made by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Status,
    Start,
    SendDelayed { delay: Duration },
    Depth,
    Purge,
    Acknowledge { size: usize },
}

/// Shared, ordered call log.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

/// Delegating wrapper that records each call before forwarding it.
pub struct Recorded<T> {
    inner: T,
    log: CallLog,
}

impl<T> Recorded<T> {
    pub fn new(inner: T, log: CallLog) -> Self {
        Self { inner, log }
    }
}

#[async_trait]
impl<T: QueueClient> QueueClient for Recorded<T> {
    async fn send_delayed(
        &self,
        message: QueueMessage,
        delay: Duration,
    ) -> Result<String, QueueError> {
        self.log.push(Call::SendDelayed { delay });
        self.inner.send_delayed(message, delay).await
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        self.log.push(Call::Depth);
        self.inner.depth().await
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        self.log.push(Call::Purge);
        self.inner.purge().await
    }

    async fn acknowledge(&self, batch: &NotificationBatch) -> Result<(), QueueError> {
        self.log.push(Call::Acknowledge { size: batch.len() });
        self.inner.acknowledge(batch).await
    }
}

#[async_trait]
impl<T: JobStatusSource> JobStatusSource for Recorded<T> {
    async fn latest_job(
        &self,
        target: &IndexTarget,
    ) -> Result<Option<IngestionJob>, IngestionError> {
        self.log.push(Call::Status);
        self.inner.latest_job(target).await
    }
}

#[async_trait]
impl<T: JobStarter> JobStarter for Recorded<T> {
    async fn start_job(&self, target: &IndexTarget) -> Result<IngestionJob, IngestionError> {
        self.log.push(Call::Start);
        self.inner.start_job(target).await
    }
}

type Ingestion = Arc<InMemoryIngestionService>;
type Queue = Arc<BufferingQueue>;

pub type HarnessCoordinator =
    Coordinator<Recorded<Ingestion>, Recorded<Queue>, Recorded<Ingestion>>;
pub type HarnessDispatcher = Dispatcher<Queue, Arc<HarnessCoordinator>>;

/// Fixed start of every harness timeline.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 4, 9, 0, 0).unwrap()
}

/// Whole pipeline on a manual clock.
pub struct TestHarness {
    pub clock: ManualClock,
    pub target: IndexTarget,
    pub queue: Queue,
    pub ingestion: Ingestion,
    pub coordinator: Arc<HarnessCoordinator>,
    pub dispatcher: Arc<HarnessDispatcher>,
    pub log: CallLog,
    sent: usize,
}

impl TestHarness {
    /// Default queue settings; jobs run until finished by hand.
    pub fn new() -> Self {
        Self::build(QueueConfig::default(), None)
    }

    pub fn with_debounce(window: Duration) -> Self {
        Self::build(QueueConfig::default().with_debounce_window(window), None)
    }

    pub fn build(queue_config: QueueConfig, job_duration: Option<Duration>) -> Self {
        let clock = ManualClock::new(epoch());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let target = IndexTarget::new("KB-E2E", "DS-E2E");
        let log = CallLog::default();

        let queue = Arc::new(BufferingQueue::new(queue_config, shared.clone()));
        let mut ingestion = InMemoryIngestionService::new(shared.clone());
        if let Some(duration) = job_duration {
            ingestion = ingestion.with_job_duration(duration);
        }
        let ingestion = Arc::new(ingestion);

        let coordinator = Arc::new(
            Coordinator::new(
                Recorded::new(ingestion.clone(), log.clone()),
                Recorded::new(queue.clone(), log.clone()),
                Recorded::new(ingestion.clone(), log.clone()),
                CoordinatorConfig::new(target.clone()),
            )
            .with_clock(shared.clone()),
        );
        let dispatcher = Arc::new(
            Dispatcher::new(queue.clone(), coordinator.clone(), DispatcherConfig::default())
                .with_clock(shared),
        );

        Self {
            clock,
            target,
            queue,
            ingestion,
            coordinator,
            dispatcher,
            log,
            sent: 0,
        }
    }

    /// Enqueue `n` creation notifications stamped with the current clock.
    pub async fn notify(&mut self, n: usize) {
        for _ in 0..n {
            let key = format!("docs/file-{:04}.md", self.sent);
            self.queue
                .send(ChangeNotification::created(key, self.clock.now()))
                .await
                .expect("Failed to enqueue notification");
            self.sent += 1;
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Dispatch until a poll does not complete an invocation.
    pub async fn pump(&self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let outcome = self
                .dispatcher
                .dispatch_once()
                .await
                .expect("Failed to receive from queue");
            let done = !matches!(outcome, DispatchOutcome::Completed(_));
            outcomes.push(outcome);
            if done {
                return outcomes;
            }
        }
    }

    /// Step the clock through `span` in `tick` increments, pumping after
    /// each step. Returns the peak number of concurrently running jobs.
    pub async fn run_for(&self, span: Duration, tick: Duration) -> usize {
        let mut peak = self.ingestion.in_progress_count(&self.target).await;
        let mut elapsed = Duration::ZERO;
        while elapsed < span {
            self.advance(tick);
            elapsed += tick;
            self.pump().await;
            peak = peak.max(self.ingestion.in_progress_count(&self.target).await);
        }
        peak
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.registry().snapshot()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Completed invocations among `outcomes`.
pub fn completed(outcomes: &[DispatchOutcome]) -> Vec<&InvocationOutcome> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            DispatchOutcome::Completed(outcome) => Some(outcome),
            _ => None,
        })
        .collect()
}
