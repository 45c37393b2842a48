//! Host runtime for the kb-sync coordinator.
//!
//! The coordinator itself is a stateless batch handler. This crate supplies
//! what a managed runtime would otherwise provide:
//!
//! - [`Dispatcher`]: pulls batches from the queue and invokes the handler
//!   behind a [`SingleFlightGate`], so at most one invocation is ever active
//! - [`DispatchRegistry`]: counters and last outcome for every dispatch
//! - [`MaintenanceScheduler`]: cron jobs (timezone-aware, cancellable)
//! - [`jobs::dead_letter_prune`]: hourly sweep of expired dead letters
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = Arc::new(Dispatcher::new(queue.clone(), coordinator, config));
//! let token = CancellationToken::new();
//! tokio::spawn({
//!     let dispatcher = dispatcher.clone();
//!     let token = token.clone();
//!     async move { dispatcher.run(token).await }
//! });
//! ```

mod config;
mod dispatcher;
mod error;
mod handler;
mod jitter;
mod registry;
mod scheduler;
mod single_flight;

pub mod jobs;

pub use config::{DispatcherConfig, SchedulerConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::SchedulerError;
pub use handler::BatchHandler;
pub use jitter::{with_jitter, Jitter};
pub use registry::{DispatchRegistry, DispatchStats};
pub use scheduler::{validate_cron_expression, MaintenanceScheduler};
pub use single_flight::{FlightPermit, SingleFlightGate};

pub use tokio_util::sync::CancellationToken;
