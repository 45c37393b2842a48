//! Ingestion service contract for kb-sync.
//!
//! The ingestion service owns re-indexing jobs. kb-sync reads the latest
//! job's status through [`JobStatusSource`] and requests new full-store
//! scans through [`JobStarter`]. The service does not reject concurrent
//! starts; keeping a single job in progress is the coordinator's job.
//!
//! [`InMemoryIngestionService`] implements both capabilities for local runs,
//! simulations and tests.

mod error;
mod memory;
mod service;

pub use error::IngestionError;
pub use memory::{InMemoryIngestionService, DEFAULT_HISTORY_LIMIT};
pub use service::{JobStarter, JobStatusSource};
