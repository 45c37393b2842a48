//! Coordinator scenarios against the in-memory queue and ingestion service.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use kb_coordinator::{Action, Coordinator, CoordinatorConfig, CoordinatorError, PurgeOutcome};
use kb_ingestion::{InMemoryIngestionService, JobStarter, JobStatusSource};
use kb_queue::{BufferingQueue, QueueClient, QueueConfig, QueueConsumer};
use kb_types::{ChangeNotification, IndexTarget, JobStatus, ManualClock, QueueMessage};

struct Setup {
    clock: ManualClock,
    queue: Arc<BufferingQueue>,
    ingestion: Arc<InMemoryIngestionService>,
    coordinator:
        Coordinator<Arc<InMemoryIngestionService>, Arc<BufferingQueue>, Arc<InMemoryIngestionService>>,
}

fn target() -> IndexTarget {
    IndexTarget::new("KB123", "DS456")
}

fn setup() -> Setup {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap());
    let shared: Arc<dyn kb_types::Clock> = Arc::new(clock.clone());

    let queue = Arc::new(BufferingQueue::new(
        QueueConfig::default().with_debounce_window(Duration::ZERO),
        shared.clone(),
    ));
    let ingestion = Arc::new(InMemoryIngestionService::new(shared.clone()));
    let coordinator = Coordinator::new(
        ingestion.clone(),
        queue.clone(),
        ingestion.clone(),
        CoordinatorConfig::new(target()),
    )
    .with_clock(shared);

    Setup {
        clock,
        queue,
        ingestion,
        coordinator,
    }
}

async fn send_changes(queue: &BufferingQueue, n: usize) {
    for i in 0..n {
        queue
            .send(ChangeNotification::created(format!("docs/file-{}.md", i), Utc::now()))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_idle_service_with_backlog_purges_then_starts() {
    let s = setup();

    send_changes(&s.queue, 1).await;
    let batch = s.queue.receive_batch().await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);

    // Three more arrive while the batch is being handled.
    send_changes(&s.queue, 3).await;
    assert_eq!(s.queue.depth().await.unwrap().pending(), 3);

    let outcome = s.coordinator.handle_batch(&batch).await.unwrap();

    assert_eq!(outcome.action, Action::Started);
    assert_eq!(outcome.status, JobStatus::InProgress);
    assert_eq!(outcome.purge, PurgeOutcome::Purged { removed: 3 });
    assert!(outcome.job_id.is_some());

    let stats = s.queue.stats().await;
    assert_eq!(stats.purges, 1);
    assert_eq!(stats.acknowledged, 1);
    assert_eq!(stats.depth.pending() + stats.depth.in_flight, 0);
    assert_eq!(s.ingestion.start_count().await, 1);

    let latest = s.ingestion.latest_job(&target()).await.unwrap().unwrap();
    assert_eq!(Some(latest.job_id), outcome.job_id);
}

#[tokio::test]
async fn test_running_job_collapses_batch_into_one_retry() {
    let s = setup();
    s.ingestion.start_job(&target()).await.unwrap();

    send_changes(&s.queue, 7).await;
    let batch = s.queue.receive_batch().await.unwrap().unwrap();
    assert_eq!(batch.len(), 7);

    let outcome = s.coordinator.handle_batch(&batch).await.unwrap();

    assert_eq!(outcome.action, Action::RetryScheduled);
    assert_eq!(outcome.status, JobStatus::InProgress);
    assert_eq!(outcome.purge, PurgeOutcome::NotAttempted);
    assert!(outcome.retry_message_id.is_some());
    assert_eq!(s.ingestion.start_count().await, 1);

    let depth = s.queue.depth().await.unwrap();
    assert_eq!(depth.visible, 0);
    assert_eq!(depth.delayed, 1);
    assert_eq!(depth.in_flight, 0);

    // The retry token stays hidden for the full retry delay.
    s.clock.advance(Duration::from_secs(299));
    assert!(s.queue.receive_batch().await.unwrap().is_none());

    s.clock.advance(Duration::from_secs(1));
    let retry = s.queue.receive_batch().await.unwrap().unwrap();
    assert_eq!(retry.len(), 1);
    assert!(matches!(retry.messages()[0].body, QueueMessage::Retry(_)));
}

#[tokio::test]
async fn test_retry_token_starts_job_once_previous_finishes() {
    let s = setup();
    s.ingestion.start_job(&target()).await.unwrap();

    send_changes(&s.queue, 2).await;
    let batch = s.queue.receive_batch().await.unwrap().unwrap();
    s.coordinator.handle_batch(&batch).await.unwrap();

    assert!(s.ingestion.complete_active(&target()).await);
    s.clock.advance(Duration::from_secs(300));

    let retry = s.queue.receive_batch().await.unwrap().unwrap();
    let outcome = s.coordinator.handle_batch(&retry).await.unwrap();

    assert_eq!(outcome.action, Action::Started);
    assert_eq!(outcome.purge, PurgeOutcome::Skipped);
    assert_eq!(s.ingestion.start_count().await, 2);
    assert_eq!(s.ingestion.max_concurrent_in_progress().await, 1);
}

#[tokio::test]
async fn test_purge_cooldown_does_not_block_start() {
    let s = setup();

    // A recent purge puts the queue in cooldown.
    s.queue.purge().await.unwrap();

    send_changes(&s.queue, 1).await;
    let batch = s.queue.receive_batch().await.unwrap().unwrap();
    send_changes(&s.queue, 2).await;

    let outcome = s.coordinator.handle_batch(&batch).await.unwrap();

    assert_eq!(outcome.action, Action::Started);
    assert!(matches!(outcome.purge, PurgeOutcome::Failed { .. }));
    assert_eq!(s.ingestion.start_count().await, 1);
    // Purge failed, so the later notifications are still queued.
    assert_eq!(s.queue.depth().await.unwrap().visible, 2);
}

#[tokio::test]
async fn test_status_outage_leaves_batch_for_redelivery() {
    let s = setup();
    s.ingestion.set_unavailable(true).await;

    send_changes(&s.queue, 4).await;
    let batch = s.queue.receive_batch().await.unwrap().unwrap();

    let err = s.coordinator.handle_batch(&batch).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::StatusQuery(_)));

    s.queue.release(&batch).await.unwrap();
    s.ingestion.set_unavailable(false).await;
    s.clock.advance(s.queue.config().redelivery_interval);

    let again = s.queue.receive_batch().await.unwrap().unwrap();
    assert_eq!(again.len(), 4);
    assert!(again.messages().iter().all(|m| m.receive_count == 2));

    let outcome = s.coordinator.handle_batch(&again).await.unwrap();
    assert_eq!(outcome.action, Action::Started);
}
