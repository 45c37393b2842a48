//! Shared types for kb-sync.
//!
//! ## Key Types
//!
//! - [`ChangeNotification`]: one object-created / object-deleted occurrence in the store
//! - [`QueueMessage`]: what the buffering queue carries (changes and retry tokens)
//! - [`NotificationBatch`]: up to [`MAX_BATCH_SIZE`] delivered messages for one invocation
//! - [`IngestionJob`]: the ingestion service's view of a re-indexing job
//! - [`Clock`]: injectable time source ([`SystemClock`], [`ManualClock`])
//! - [`Settings`]: layered configuration

pub mod batch;
pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod notification;

pub use batch::{NotificationBatch, ReceivedMessage, MAX_BATCH_SIZE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CoordinatorSettings, DispatcherSettings, IndexSettings, MaintenanceSettings, QueueSettings,
    Settings,
};
pub use error::KbError;
pub use job::{IndexTarget, IngestionJob, JobId, JobStatus};
pub use notification::{ChangeKind, ChangeNotification, QueueMessage, RetryToken};
