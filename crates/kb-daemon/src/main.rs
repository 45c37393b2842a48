//! kb-sync: keeps a knowledge-base index in step with its document store.
//!
//! # Usage
//!
//! ```bash
//! kb-sync run [--debounce-secs N] [--job-duration-secs D]
//! kb-sync simulate --notifications 50 --spacing-ms 500 --job-duration-secs 240
//! kb-sync config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/kb-sync/config.toml)
//! 3. `--config` file
//! 4. Environment variables (KBSYNC_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use kb_daemon::{run_pipeline, show_config, simulate, Cli, Commands, SimulationParams};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            debounce_secs,
            job_duration_secs,
        } => {
            run_pipeline(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                debounce_secs,
                job_duration_secs,
            )
            .await?;
        }
        Commands::Simulate {
            notifications,
            spacing_ms,
            job_duration_secs,
            horizon_secs,
            debounce_secs,
        } => {
            let params = SimulationParams::new(notifications, spacing_ms, job_duration_secs, horizon_secs);
            simulate(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                debounce_secs,
                params,
            )
            .await?;
        }
        Commands::Config => {
            show_config(cli.config.as_deref())?;
        }
    }

    Ok(())
}
