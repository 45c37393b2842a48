//! Coordinator configuration.

use std::time::Duration;

use kb_types::{IndexTarget, Settings};

/// Configuration for a [`crate::Coordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// The index kept in sync
    pub target: IndexTarget,

    /// Delay of the retry token enqueued while a job is running (default: 300s)
    pub retry_delay: Duration,
}

impl CoordinatorConfig {
    pub fn new(target: IndexTarget) -> Self {
        Self {
            target,
            retry_delay: Duration::from_secs(300),
        }
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            target: settings.index.target(),
            retry_delay: Duration::from_secs(settings.coordinator.retry_delay_secs),
        }
    }

    /// Set the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}
