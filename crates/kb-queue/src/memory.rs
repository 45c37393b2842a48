//! In-memory buffering queue.
//!
//! Message lifecycle:
//! 1. `send` / `send_delayed` stores the message, invisible until its delay elapses
//! 2. `receive_batch` delivers visible messages once the debounce window has
//!    passed since the oldest of them became visible, or a full batch is ready
//! 3. Delivery bumps the receive count, issues a fresh receipt handle and hides
//!    the message for the redelivery interval
//! 4. `acknowledge` deletes the batch; `release` (or an expired redelivery
//!    interval) makes it deliverable again
//! 5. A message whose receive count reached the limit is moved to the
//!    dead-letter sink instead of being delivered again

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use kb_types::{Clock, NotificationBatch, QueueMessage, ReceivedMessage, SystemClock};

use crate::{DeadLetter, QueueClient, QueueConfig, QueueConsumer, QueueDepth, QueueError};

/// Counters and depth of a [`BufferingQueue`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub depth: QueueDepth,
    pub dead_letters: usize,
    pub sent: u64,
    pub delivered: u64,
    pub acknowledged: u64,
    pub released: u64,
    pub purges: u64,
    pub purged_messages: u64,
    pub dead_lettered: u64,
}

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: QueueMessage,
    sent_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    receive_count: u32,
    /// Handle of the latest delivery, if the message was ever delivered
    receipt: Option<String>,
}

impl StoredMessage {
    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.visible_at <= now
    }

    fn is_in_flight(&self, now: DateTime<Utc>) -> bool {
        self.receipt.is_some() && self.visible_at > now
    }

    fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        self.receipt.is_none() && self.visible_at > now
    }

    fn into_dead_letter(self, now: DateTime<Utc>) -> DeadLetter {
        DeadLetter {
            message_id: self.message_id,
            body: self.body,
            sent_at: self.sent_at,
            receive_count: self.receive_count,
            dead_lettered_at: now,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    messages: Vec<StoredMessage>,
    dead_letters: Vec<DeadLetter>,
    last_purge_at: Option<DateTime<Utc>>,
    stats: QueueStats,
}

impl QueueState {
    fn depth(&self, now: DateTime<Utc>) -> QueueDepth {
        let mut depth = QueueDepth::default();
        for m in &self.messages {
            if m.is_visible(now) {
                depth.visible += 1;
            } else if m.is_in_flight(now) {
                depth.in_flight += 1;
            } else if m.is_delayed(now) {
                depth.delayed += 1;
            }
        }
        depth
    }

    fn push_dead_letter(&mut self, letter: DeadLetter, capacity: usize) {
        self.dead_letters.push(letter);
        self.stats.dead_lettered += 1;

        let excess = self.dead_letters.len().saturating_sub(capacity);
        if excess > 0 {
            self.dead_letters.drain(..excess);
            warn!(evicted = excess, capacity, "Dead-letter sink full, evicted oldest entries");
        }
    }

    /// Move every visible message that used up its deliveries to the sink.
    fn dead_letter_exhausted(
        &mut self,
        now: DateTime<Utc>,
        max_receive_count: u32,
        capacity: usize,
    ) {
        let (exhausted, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.is_visible(now) && m.receive_count >= max_receive_count);
        self.messages = keep;

        for message in exhausted {
            warn!(
                message_id = %message.message_id,
                receive_count = message.receive_count,
                body = %message.body.describe(),
                "Moving message to dead-letter sink"
            );
            self.push_dead_letter(message.into_dead_letter(now), capacity);
        }
    }
}

/// In-memory buffering queue with a dead-letter sink.
///
/// All time-dependent behavior reads the injected [`Clock`].
#[derive(Debug)]
pub struct BufferingQueue {
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// `now + d`, pinned to the end of time instead of overflowing.
fn after(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    now.checked_add_signed(to_chrono(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl BufferingQueue {
    /// Create a queue reading time from `clock`.
    pub fn new(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Create a queue on the system clock.
    pub fn with_system_clock(config: QueueConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a message that is deliverable immediately.
    pub async fn send(&self, message: impl Into<QueueMessage>) -> Result<String, QueueError> {
        self.enqueue(message.into(), Duration::ZERO).await
    }

    async fn enqueue(&self, body: QueueMessage, delay: Duration) -> Result<String, QueueError> {
        if delay > self.config.max_delay {
            return Err(QueueError::InvalidDelay {
                requested_secs: delay.as_secs(),
                max_secs: self.config.max_delay.as_secs(),
            });
        }

        let now = self.clock.now();
        let message_id = Ulid::new().to_string();
        debug!(
            message_id = %message_id,
            delay_secs = delay.as_secs(),
            body = %body.describe(),
            "Enqueued message"
        );

        let mut state = self.state.lock().await;
        state.messages.push(StoredMessage {
            message_id: message_id.clone(),
            body,
            sent_at: now,
            visible_at: after(now, delay),
            receive_count: 0,
            receipt: None,
        });
        state.stats.sent += 1;

        Ok(message_id)
    }

    /// Entries currently held by the dead-letter sink.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Drop dead letters older than the retention period.
    ///
    /// Returns the number of removed entries.
    pub async fn prune_dead_letters(&self) -> usize {
        let now = self.clock.now();
        let retention = to_chrono(self.config.dead_letter_retention);

        let mut state = self.state.lock().await;
        let before = state.dead_letters.len();
        state
            .dead_letters
            .retain(|letter| !letter.is_expired(now, retention));
        let removed = before - state.dead_letters.len();

        if removed > 0 {
            info!(removed, "Pruned expired dead letters");
        }
        removed
    }

    /// Counters plus a fresh depth snapshot.
    pub async fn stats(&self) -> QueueStats {
        let now = self.clock.now();
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.depth = state.depth(now);
        stats.dead_letters = state.dead_letters.len();
        stats
    }
}

#[async_trait]
impl QueueClient for BufferingQueue {
    async fn send_delayed(
        &self,
        message: QueueMessage,
        delay: Duration,
    ) -> Result<String, QueueError> {
        self.enqueue(message, delay).await
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let now = self.clock.now();
        Ok(self.state.lock().await.depth(now))
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let cooldown = to_chrono(self.config.purge_cooldown);

        let mut state = self.state.lock().await;
        if let Some(last) = state.last_purge_at {
            let elapsed = now - last;
            if elapsed < cooldown {
                let remaining = cooldown
                    .checked_sub(&elapsed)
                    .map(|d| d.num_seconds().max(1) as u64)
                    .unwrap_or(u64::MAX);
                return Err(QueueError::PurgeCooldown {
                    retry_after_secs: remaining,
                });
            }
        }

        let before = state.messages.len();
        state.messages.retain(|m| m.is_in_flight(now));
        let purged = (before - state.messages.len()) as u64;

        state.last_purge_at = Some(now);
        state.stats.purges += 1;
        state.stats.purged_messages += purged;

        debug!(purged, "Purged queue");
        Ok(purged)
    }

    async fn acknowledge(&self, batch: &NotificationBatch) -> Result<(), QueueError> {
        let handles = batch.receipt_handles();

        let mut state = self.state.lock().await;
        let before = state.messages.len();
        state.messages.retain(|m| match &m.receipt {
            Some(receipt) => !handles.contains(receipt),
            None => true,
        });
        let removed = before - state.messages.len();
        state.stats.acknowledged += removed as u64;

        if removed < handles.len() {
            // Already acknowledged, purged, or redelivered under a newer handle.
            debug!(
                requested = handles.len(),
                removed, "Some receipt handles no longer matched a message"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for BufferingQueue {
    async fn receive_batch(&self) -> Result<Option<NotificationBatch>, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        state.dead_letter_exhausted(
            now,
            self.config.max_receive_count,
            self.config.dead_letter_capacity,
        );

        let mut ready: Vec<usize> = state
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_visible(now))
            .map(|(i, _)| i)
            .collect();
        if ready.is_empty() {
            return Ok(None);
        }
        ready.sort_by_key(|&i| (state.messages[i].visible_at, state.messages[i].sent_at));

        let oldest = state.messages[ready[0]].visible_at;
        let window_elapsed = now - oldest >= to_chrono(self.config.debounce_window);
        let batch_full = ready.len() >= self.config.max_batch_size;
        if !window_elapsed && !batch_full {
            debug!(
                visible = ready.len(),
                "Debounce window still open, holding messages"
            );
            return Ok(None);
        }

        ready.truncate(self.config.max_batch_size);
        let hidden_until = after(now, self.config.redelivery_interval);

        let mut delivered = Vec::with_capacity(ready.len());
        for i in ready {
            let message = &mut state.messages[i];
            let receipt = Ulid::new().to_string();
            message.receive_count += 1;
            message.visible_at = hidden_until;
            message.receipt = Some(receipt.clone());

            delivered.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle: receipt,
                receive_count: message.receive_count,
                sent_at: message.sent_at,
                body: message.body.clone(),
            });
        }
        state.stats.delivered += delivered.len() as u64;

        let batch = NotificationBatch::new(delivered)?;
        debug!(
            size = batch.len(),
            retries = batch.retry_count(),
            max_receive_count = batch.max_receive_count(),
            "Delivering batch"
        );
        Ok(Some(batch))
    }

    async fn release(&self, batch: &NotificationBatch) -> Result<(), QueueError> {
        let now = self.clock.now();
        let visible_again = after(now, self.config.redelivery_interval);
        let handles = batch.receipt_handles();

        let mut state = self.state.lock().await;
        let mut released = 0u64;
        for message in state.messages.iter_mut() {
            let matches = message
                .receipt
                .as_ref()
                .map(|r| handles.contains(r))
                .unwrap_or(false);
            if matches {
                message.visible_at = visible_again;
                released += 1;
            }
        }
        state.stats.released += released;

        // Messages out of deliveries go to the sink right away rather than
        // waiting out another redelivery interval.
        let limit = self.config.max_receive_count;
        let (exhausted, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut state.messages)
            .into_iter()
            .partition(|m| {
                m.receive_count >= limit
                    && m.receipt.as_ref().map(|r| handles.contains(r)).unwrap_or(false)
            });
        state.messages = keep;
        for message in exhausted {
            warn!(
                message_id = %message.message_id,
                receive_count = message.receive_count,
                "Delivery limit reached, moving message to dead-letter sink"
            );
            state.push_dead_letter(message.into_dead_letter(now), self.config.dead_letter_capacity);
        }

        debug!(released, "Released batch for redelivery");
        Ok(())
    }
}
