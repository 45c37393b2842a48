//! kb-sync daemon library exports.
//!
//! - `cli`: argument parsing with clap
//! - `commands`: run / simulate / config
//! - `simulate`: deterministic replay of a change burst on a manual clock

pub mod cli;
pub mod commands;
pub mod simulate;

pub use cli::{Cli, Commands};
pub use commands::{load_settings, parse_notification_line, run_pipeline, show_config, simulate};
pub use simulate::{SimulationParams, SimulationReport};
