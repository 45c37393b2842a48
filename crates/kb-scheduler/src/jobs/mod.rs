//! Maintenance jobs registered with the [`crate::MaintenanceScheduler`].

pub mod dead_letter_prune;

pub use dead_letter_prune::{
    register_dead_letter_prune_job, DeadLetterPruneJob, DeadLetterPruneJobConfig,
};
