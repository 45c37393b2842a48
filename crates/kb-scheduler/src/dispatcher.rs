//! The host loop: receive a batch, invoke the handler, settle the batch.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kb_coordinator::InvocationOutcome;
use kb_queue::QueueConsumer;
use kb_types::{Clock, NotificationBatch, SystemClock};

use crate::{BatchHandler, DispatchRegistry, DispatcherConfig, SchedulerError, SingleFlightGate};

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Another invocation held the gate
    Skipped,
    /// Nothing was deliverable
    Idle,
    Completed(InvocationOutcome),
    /// Handler returned an error; the batch was released
    Failed { reason: String },
    /// Handler exceeded the invocation timeout; the batch was released
    TimedOut,
}

/// Drives a [`BatchHandler`] from a [`QueueConsumer`], one invocation at a time.
pub struct Dispatcher<C, H> {
    consumer: C,
    handler: H,
    config: DispatcherConfig,
    gate: SingleFlightGate,
    registry: Arc<DispatchRegistry>,
    clock: Arc<dyn Clock>,
}

impl<C, H> Dispatcher<C, H>
where
    C: QueueConsumer,
    H: BatchHandler,
{
    pub fn new(consumer: C, handler: H, config: DispatcherConfig) -> Self {
        Self {
            consumer,
            handler,
            config,
            gate: SingleFlightGate::new(),
            registry: Arc::new(DispatchRegistry::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Timestamp registry entries with `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a registry with other observers.
    pub fn with_registry(mut self, registry: Arc<DispatchRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> Arc<DispatchRegistry> {
        self.registry.clone()
    }

    pub fn gate(&self) -> &SingleFlightGate {
        &self.gate
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Poll the queue once and, if a batch is ready, invoke the handler.
    ///
    /// Only a failed receive is returned as an error. Handler failures are
    /// absorbed: the batch is released and the outcome says what happened.
    pub async fn dispatch_once(&self) -> Result<DispatchOutcome, SchedulerError> {
        let Some(_permit) = self.gate.try_acquire() else {
            debug!("Invocation already active, skipping poll");
            self.registry.record_skipped();
            return Ok(DispatchOutcome::Skipped);
        };

        let Some(batch) = self.consumer.receive_batch().await? else {
            self.registry.record_empty();
            return Ok(DispatchOutcome::Idle);
        };

        let started = Instant::now();
        let result =
            tokio::time::timeout(self.config.invocation_timeout, self.handler.handle(&batch)).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let at = self.clock.now();

        match result {
            Ok(Ok(outcome)) => {
                self.registry.record_success(&outcome, duration_ms, at);
                Ok(DispatchOutcome::Completed(outcome))
            }
            Ok(Err(e)) => {
                warn!(error = %e, batch_size = batch.len(), "Invocation failed, releasing batch");
                self.release(&batch).await;
                self.registry.record_failure(e.to_string(), false, duration_ms, at);
                Ok(DispatchOutcome::Failed {
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.invocation_timeout.as_secs(),
                    batch_size = batch.len(),
                    "Invocation timed out, releasing batch"
                );
                self.release(&batch).await;
                self.registry
                    .record_failure("invocation timed out".to_string(), true, duration_ms, at);
                Ok(DispatchOutcome::TimedOut)
            }
        }
    }

    /// A failed release is only logged; the batch still comes back once its
    /// redelivery interval runs out.
    async fn release(&self, batch: &NotificationBatch) {
        if let Err(e) = self.consumer.release(batch).await {
            warn!(error = %e, "Failed to release batch");
        }
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// After a poll that handled a batch the next poll follows immediately,
    /// so a backlog drains without waiting out the poll interval.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            invocation_timeout_secs = self.config.invocation_timeout.as_secs(),
            "Dispatcher started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            loop {
                match self.dispatch_once().await {
                    Ok(DispatchOutcome::Completed(_)) if !shutdown.is_cancelled() => continue,
                    Ok(_) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to receive from queue");
                        break;
                    }
                }
            }
        }

        info!("Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use kb_coordinator::{Action, CoordinatorError, PurgeOutcome};
    use kb_ingestion::IngestionError;
    use kb_queue::{BufferingQueue, QueueConfig};
    use kb_types::{ChangeNotification, JobId, JobStatus, ManualClock};

    /// Handler that acknowledges through the queue, or fails, or hangs.
    struct ScriptedHandler {
        queue: Arc<BufferingQueue>,
        mode: Mode,
        calls: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Start,
        Fail,
        Hang,
    }

    #[async_trait]
    impl BatchHandler for ScriptedHandler {
        async fn handle(
            &self,
            batch: &NotificationBatch,
        ) -> Result<InvocationOutcome, CoordinatorError> {
            use kb_queue::QueueClient;

            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Start => {
                    self.queue.acknowledge(batch).await.map_err(CoordinatorError::Acknowledge)?;
                    Ok(InvocationOutcome {
                        action: Action::Started,
                        job_id: Some(JobId::generate()),
                        status: JobStatus::InProgress,
                        purge: PurgeOutcome::Skipped,
                        retry_message_id: None,
                        batch_size: batch.len(),
                    })
                }
                Mode::Fail => Err(CoordinatorError::StatusQuery(IngestionError::Unavailable(
                    "status endpoint offline".into(),
                ))),
                Mode::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("invocation should have timed out")
                }
            }
        }
    }

    type TestDispatcher = Dispatcher<Arc<BufferingQueue>, Arc<ScriptedHandler>>;

    fn fixture(mode: Mode) -> (Arc<BufferingQueue>, TestDispatcher, Arc<ScriptedHandler>) {
        let clock = ManualClock::starting_now();
        let queue = Arc::new(BufferingQueue::new(
            QueueConfig::default().with_debounce_window(Duration::ZERO),
            Arc::new(clock),
        ));
        let handler = Arc::new(ScriptedHandler {
            queue: queue.clone(),
            mode,
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(
            queue.clone(),
            handler.clone(),
            DispatcherConfig::default()
                .with_poll_interval(Duration::from_millis(100))
                .with_invocation_timeout(Duration::from_secs(5)),
        );
        (queue, dispatcher, handler)
    }

    async fn send(queue: &BufferingQueue, n: usize) {
        for i in 0..n {
            queue
                .send(ChangeNotification::created(format!("k{}", i), Utc::now()))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_idle_poll() {
        let (_queue, dispatcher, handler) = fixture(Mode::Start);

        let outcome = dispatcher.dispatch_once().await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Idle);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.registry().snapshot().empty_polls, 1);
    }

    #[tokio::test]
    async fn test_completed_dispatch_is_recorded() {
        let (queue, dispatcher, _handler) = fixture(Mode::Start);
        send(&queue, 3).await;

        let outcome = dispatcher.dispatch_once().await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Completed(ref o) if o.batch_size == 3));
        let stats = dispatcher.registry().snapshot();
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.jobs_started, 1);
        assert!(!dispatcher.gate().is_busy());
        assert_eq!(queue.stats().await.acknowledged, 3);
    }

    #[tokio::test]
    async fn test_busy_gate_skips_poll() {
        let (queue, dispatcher, handler) = fixture(Mode::Start);
        send(&queue, 1).await;

        let _held = dispatcher.gate().try_acquire().unwrap();
        let outcome = dispatcher.dispatch_once().await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.stats().await.delivered, 0);
        assert_eq!(dispatcher.registry().snapshot().skipped_polls, 1);
    }

    #[tokio::test]
    async fn test_failed_invocation_releases_batch() {
        let (queue, dispatcher, _handler) = fixture(Mode::Fail);
        send(&queue, 2).await;

        let outcome = dispatcher.dispatch_once().await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
        let stats = queue.stats().await;
        assert_eq!(stats.released, 2);
        assert_eq!(stats.acknowledged, 0);
        assert_eq!(dispatcher.registry().snapshot().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_invocation_times_out() {
        let (queue, dispatcher, _handler) = fixture(Mode::Hang);
        send(&queue, 1).await;

        let outcome = dispatcher.dispatch_once().await.unwrap();

        assert_eq!(outcome, DispatchOutcome::TimedOut);
        assert_eq!(queue.stats().await.released, 1);
        let stats = dispatcher.registry().snapshot();
        assert_eq!(stats.timeouts, 1);
        assert!(!dispatcher.gate().is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_and_stops_on_cancel() {
        let (queue, dispatcher, handler) = fixture(Mode::Start);
        send(&queue, 25).await;

        let dispatcher = Arc::new(dispatcher);
        let token = CancellationToken::new();
        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let token = token.clone();
            async move { dispatcher.run(token).await }
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        token.cancel();
        task.await.unwrap();

        // 25 messages in batches of 10.
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.stats().await.acknowledged, 25);
    }
}
