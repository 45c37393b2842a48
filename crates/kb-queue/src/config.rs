//! Queue configuration.

use std::time::Duration;

use kb_types::config::MAX_MESSAGE_DELAY_SECS;
use kb_types::{QueueSettings, MAX_BATCH_SIZE};

/// Runtime configuration of a [`crate::BufferingQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Quiet window measured from the oldest visible message.
    pub debounce_window: Duration,
    /// Messages per batch; a full batch is delivered without waiting.
    pub max_batch_size: usize,
    /// Deliveries before a message is dead-lettered.
    pub max_receive_count: u32,
    /// Invisibility after a receive or a release.
    pub redelivery_interval: Duration,
    /// Minimum spacing between purges.
    pub purge_cooldown: Duration,
    /// Longest accepted send delay.
    pub max_delay: Duration,
    /// Dead-letter retention.
    pub dead_letter_retention: Duration,
    /// Most entries the dead-letter sink holds; the oldest are evicted first.
    pub dead_letter_capacity: usize,
}

/// Default bound of the dead-letter sink.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 10_000;

impl Default for QueueConfig {
    fn default() -> Self {
        Self::from(&QueueSettings::default())
    }
}

impl From<&QueueSettings> for QueueConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            debounce_window: Duration::from_secs(settings.debounce_window_secs),
            max_batch_size: settings.max_batch_size.clamp(1, MAX_BATCH_SIZE),
            max_receive_count: settings.max_receive_count.max(1),
            redelivery_interval: Duration::from_secs(settings.redelivery_interval_secs),
            purge_cooldown: Duration::from_secs(settings.purge_cooldown_secs),
            max_delay: Duration::from_secs(MAX_MESSAGE_DELAY_SECS),
            dead_letter_retention: Duration::from_secs(
                settings.dead_letter_retention_days.saturating_mul(24 * 60 * 60),
            ),
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
        }
    }
}

impl QueueConfig {
    /// Set the debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Set the purge cooldown.
    pub fn with_purge_cooldown(mut self, cooldown: Duration) -> Self {
        self.purge_cooldown = cooldown;
        self
    }

    /// Set the redelivery interval.
    pub fn with_redelivery_interval(mut self, interval: Duration) -> Self {
        self.redelivery_interval = interval;
        self
    }

    /// Bound the dead-letter sink (at least one entry).
    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity.max(1);
        self
    }

    /// Set the maximum receive count.
    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.max_receive_count = count.max(1);
        self
    }
}
