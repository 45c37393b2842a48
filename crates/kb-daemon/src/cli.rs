//! CLI argument parsing for kb-sync.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Knowledge-base ingestion coordinator
///
/// Collapses bursts of document-store changes into as few re-indexing jobs
/// as possible, never running two at once.
#[derive(Parser, Debug)]
#[command(name = "kb-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/kb-sync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline in the foreground, reading change events from stdin
    ///
    /// Each stdin line is `<event> <object-key>` (e.g. `ObjectCreated:Put docs/a.pdf`)
    /// or a bare object key, which counts as a creation.
    Run {
        /// Override the queue debounce window (0-300)
        #[arg(long)]
        debounce_secs: Option<u64>,

        /// How long each in-memory ingestion job runs
        #[arg(long, default_value = "30")]
        job_duration_secs: u64,
    },

    /// Replay a synthetic burst of changes on a simulated clock and print a JSON report
    Simulate {
        /// Number of change notifications to emit
        #[arg(short, long, default_value = "20")]
        notifications: usize,

        /// Gap between consecutive notifications
        #[arg(long, default_value = "1000")]
        spacing_ms: u64,

        /// How long each ingestion job runs
        #[arg(long, default_value = "240")]
        job_duration_secs: u64,

        /// Simulated time to cover
        #[arg(long, default_value = "1800")]
        horizon_secs: u64,

        /// Override the queue debounce window (0-300)
        #[arg(long)]
        debounce_secs: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_defaults() {
        let cli = Cli::parse_from(["kb-sync", "run"]);
        match cli.command {
            Commands::Run {
                debounce_secs,
                job_duration_secs,
            } => {
                assert_eq!(debounce_secs, None);
                assert_eq!(job_duration_secs, 30);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_run_debounce() {
        let cli = Cli::parse_from(["kb-sync", "run", "--debounce-secs", "5"]);
        match cli.command {
            Commands::Run { debounce_secs, .. } => assert_eq!(debounce_secs, Some(5)),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_simulate() {
        let cli = Cli::parse_from([
            "kb-sync",
            "simulate",
            "-n",
            "50",
            "--spacing-ms",
            "250",
            "--job-duration-secs",
            "90",
            "--horizon-secs",
            "600",
        ]);
        match cli.command {
            Commands::Simulate {
                notifications,
                spacing_ms,
                job_duration_secs,
                horizon_secs,
                debounce_secs,
            } => {
                assert_eq!(notifications, 50);
                assert_eq!(spacing_ms, 250);
                assert_eq!(job_duration_secs, 90);
                assert_eq!(horizon_secs, 600);
                assert_eq!(debounce_secs, None);
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from(["kb-sync", "config", "--config", "/etc/kb.toml", "-l", "debug"]);
        assert!(matches!(cli.command, Commands::Config));
        assert_eq!(cli.config.as_deref(), Some("/etc/kb.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
