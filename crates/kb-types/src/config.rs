//! Configuration loading for kb-sync.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/kb-sync/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::KbError;
use crate::job::IndexTarget;

/// Upper bound of the debounce window, in seconds.
pub const MAX_DEBOUNCE_WINDOW_SECS: u64 = 300;

/// Longest delay the queue accepts for a single message, in seconds.
pub const MAX_MESSAGE_DELAY_SECS: u64 = 900;

/// Longest a delivered message may stay invisible, in seconds (12 h).
pub const MAX_REDELIVERY_INTERVAL_SECS: u64 = 12 * 60 * 60;

/// Longest accepted purge cooldown, in seconds (1 day).
pub const MAX_PURGE_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Dead-letter retention range, in days.
pub const MAX_DEAD_LETTER_RETENTION_DAYS: u64 = 14;

/// Longest pause between two dispatcher polls, in milliseconds.
pub const MAX_POLL_INTERVAL_MS: u64 = 60 * 1000;

/// Longest random delay before a maintenance sweep, in seconds.
pub const MAX_JITTER_SECS: u64 = 60 * 60;

/// Which knowledge base / data source the coordinator keeps in sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_knowledge_base_id")]
    pub knowledge_base_id: String,

    #[serde(default = "default_data_source_id")]
    pub data_source_id: String,
}

fn default_knowledge_base_id() -> String {
    "local-kb".to_string()
}

fn default_data_source_id() -> String {
    "local-source".to_string()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            knowledge_base_id: default_knowledge_base_id(),
            data_source_id: default_data_source_id(),
        }
    }
}

impl IndexSettings {
    pub fn target(&self) -> IndexTarget {
        IndexTarget::new(&self.knowledge_base_id, &self.data_source_id)
    }
}

/// Buffering queue behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Quiet window before a partial batch is delivered (0-300 s).
    #[serde(default = "default_debounce_window")]
    pub debounce_window_secs: u64,

    /// Messages per delivered batch (1-10).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Deliveries without acknowledgment before a message is dead-lettered.
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    /// How long a delivered or released message stays invisible.
    #[serde(default = "default_redelivery_interval")]
    pub redelivery_interval_secs: u64,

    /// Minimum spacing between two purges.
    #[serde(default = "default_purge_cooldown")]
    pub purge_cooldown_secs: u64,

    /// How long dead letters are retained for inspection.
    #[serde(default = "default_dead_letter_retention")]
    pub dead_letter_retention_days: u64,
}

fn default_debounce_window() -> u64 {
    60
}

fn default_max_batch_size() -> usize {
    10
}

fn default_max_receive_count() -> u32 {
    10
}

fn default_redelivery_interval() -> u64 {
    120
}

fn default_purge_cooldown() -> u64 {
    60
}

fn default_dead_letter_retention() -> u64 {
    14
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            debounce_window_secs: default_debounce_window(),
            max_batch_size: default_max_batch_size(),
            max_receive_count: default_max_receive_count(),
            redelivery_interval_secs: default_redelivery_interval(),
            purge_cooldown_secs: default_purge_cooldown(),
            dead_letter_retention_days: default_dead_letter_retention(),
        }
    }
}

/// Coordinator behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Delay of the retry token enqueued while a job is running.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_retry_delay() -> u64 {
    300
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Host loop behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Pause between two receive attempts
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// An invocation running longer than this is treated as failed
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_invocation_timeout() -> u64 {
    60
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            invocation_timeout_secs: default_invocation_timeout(),
        }
    }
}

/// Background maintenance (dead-letter retention sweep).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    /// 6-field cron expression for the dead-letter sweep (default: hourly)
    #[serde(default = "default_prune_cron")]
    pub dead_letter_prune_cron: String,

    /// IANA timezone for the cron schedule
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Max random delay before each sweep
    #[serde(default)]
    pub jitter_secs: u64,
}

fn default_prune_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            dead_letter_prune_cron: default_prune_cron(),
            timezone: default_timezone(),
            jitter_secs: 0,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub coordinator: CoordinatorSettings,

    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    #[serde(default)]
    pub maintenance: MaintenanceSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/kb-sync/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (KBSYNC_*, nested keys joined with `__`,
    ///    e.g. KBSYNC_QUEUE__DEBOUNCE_WINDOW_SECS)
    ///
    /// CLI flags should be applied by the caller after this returns, followed
    /// by [`Settings::validate`]. Loading does not validate, so a flag can
    /// still replace an out-of-range file or env value.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, KbError> {
        let config_dir = ProjectDirs::from("", "", "kb-sync")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| KbError::Config(e.to_string()))?
            .set_default("index.knowledge_base_id", default_knowledge_base_id())
            .map_err(|e| KbError::Config(e.to_string()))?
            .set_default("index.data_source_id", default_data_source_id())
            .map_err(|e| KbError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("KBSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| KbError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| KbError::Config(e.to_string()))?;

        Ok(settings)
    }

    /// Check value ranges the rest of the system relies on.
    pub fn validate(&self) -> Result<(), KbError> {
        let q = &self.queue;
        if q.debounce_window_secs > MAX_DEBOUNCE_WINDOW_SECS {
            return Err(KbError::Config(format!(
                "queue.debounce_window_secs must be 0-{}, got {}",
                MAX_DEBOUNCE_WINDOW_SECS, q.debounce_window_secs
            )));
        }
        if q.max_batch_size == 0 || q.max_batch_size > crate::MAX_BATCH_SIZE {
            return Err(KbError::Config(format!(
                "queue.max_batch_size must be 1-{}, got {}",
                crate::MAX_BATCH_SIZE,
                q.max_batch_size
            )));
        }
        if q.max_receive_count == 0 {
            return Err(KbError::Config(
                "queue.max_receive_count must be > 0".to_string(),
            ));
        }
        if q.redelivery_interval_secs > MAX_REDELIVERY_INTERVAL_SECS {
            return Err(KbError::Config(format!(
                "queue.redelivery_interval_secs must be <= {}, got {}",
                MAX_REDELIVERY_INTERVAL_SECS, q.redelivery_interval_secs
            )));
        }
        if q.redelivery_interval_secs <= self.dispatcher.invocation_timeout_secs {
            return Err(KbError::Config(format!(
                "queue.redelivery_interval_secs ({}) must exceed dispatcher.invocation_timeout_secs ({})",
                q.redelivery_interval_secs, self.dispatcher.invocation_timeout_secs
            )));
        }
        if q.purge_cooldown_secs > MAX_PURGE_COOLDOWN_SECS {
            return Err(KbError::Config(format!(
                "queue.purge_cooldown_secs must be <= {}, got {}",
                MAX_PURGE_COOLDOWN_SECS, q.purge_cooldown_secs
            )));
        }
        if q.dead_letter_retention_days == 0
            || q.dead_letter_retention_days > MAX_DEAD_LETTER_RETENTION_DAYS
        {
            return Err(KbError::Config(format!(
                "queue.dead_letter_retention_days must be 1-{}, got {}",
                MAX_DEAD_LETTER_RETENTION_DAYS, q.dead_letter_retention_days
            )));
        }
        if self.dispatcher.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(KbError::Config(format!(
                "dispatcher.poll_interval_ms must be <= {}, got {}",
                MAX_POLL_INTERVAL_MS, self.dispatcher.poll_interval_ms
            )));
        }
        if self.maintenance.jitter_secs > MAX_JITTER_SECS {
            return Err(KbError::Config(format!(
                "maintenance.jitter_secs must be <= {}, got {}",
                MAX_JITTER_SECS, self.maintenance.jitter_secs
            )));
        }
        if self.coordinator.retry_delay_secs > MAX_MESSAGE_DELAY_SECS {
            return Err(KbError::Config(format!(
                "coordinator.retry_delay_secs must be <= {}, got {}",
                MAX_MESSAGE_DELAY_SECS, self.coordinator.retry_delay_secs
            )));
        }
        if self.index.knowledge_base_id.is_empty() || self.index.data_source_id.is_empty() {
            return Err(KbError::Config(
                "index.knowledge_base_id and index.data_source_id must be set".to_string(),
            ));
        }
        Ok(())
    }
}
