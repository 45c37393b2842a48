//! Ingestion-job coordinator for kb-sync.
//!
//! Each invocation receives one batch of buffered change notifications and
//! leaves the queue and the ingestion service in a consistent state:
//!
//! 1. Read the latest job status
//! 2. IN_PROGRESS: enqueue one delayed retry token, acknowledge the batch
//! 3. Anything else: purge the queue if it holds undelivered messages
//!    (best effort), start a new job, acknowledge the batch
//!
//! The coordinator keeps no state between invocations and takes no locks.
//! It must be hosted so that at most one invocation runs at a time; two
//! overlapping invocations could both see an idle service and both start a
//! job.
//!
//! ## Key Components
//!
//! - [`Coordinator`]: the invocation handler, generic over its three collaborators
//! - [`Decision`] / [`PurgePlan`]: the pure decision rules
//! - [`InvocationOutcome`]: what an invocation did, for logs and the host's registry
//! - [`CoordinatorError`]: failures that must cause the batch to be redelivered

mod config;
mod coordinator;
mod decision;
mod error;
mod outcome;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use decision::{Decision, PurgePlan};
pub use error::CoordinatorError;
pub use outcome::{Action, InvocationOutcome, PurgeOutcome};
