//! Dispatcher and scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use kb_types::{DispatcherSettings, MaintenanceSettings};

use crate::SchedulerError;

/// Configuration for the [`crate::Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Pause between polls of the queue.
    pub poll_interval: Duration,
    /// An invocation still running after this long is abandoned and its
    /// batch released.
    pub invocation_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&DispatcherSettings::default())
    }
}

impl From<&DispatcherSettings> for DispatcherConfig {
    fn from(settings: &DispatcherSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            invocation_timeout: Duration::from_secs(settings.invocation_timeout_secs.max(1)),
        }
    }
}

impl DispatcherConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }
}

/// Configuration for the [`crate::MaintenanceScheduler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default timezone for jobs (IANA name, e.g. "Europe/Berlin").
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Upper bound on how long shutdown waits for the cron runtime.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl From<&MaintenanceSettings> for SchedulerConfig {
    fn from(settings: &MaintenanceSettings) -> Self {
        Self {
            default_timezone: settings.timezone.clone(),
            ..Default::default()
        }
    }
}

impl SchedulerConfig {
    /// Parse the configured default timezone.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }
}
