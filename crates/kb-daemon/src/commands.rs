//! Command implementations for kb-sync.
//!
//! - run: assemble the in-memory pipeline on the system clock and serve
//!   until Ctrl+C / SIGTERM
//! - simulate: replay a synthetic timeline and print a JSON report
//! - config: print the effective settings

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};

use kb_coordinator::{Coordinator, CoordinatorConfig};
use kb_ingestion::InMemoryIngestionService;
use kb_queue::{BufferingQueue, QueueConfig};
use kb_scheduler::jobs::{register_dead_letter_prune_job, DeadLetterPruneJob, DeadLetterPruneJobConfig};
use kb_scheduler::{CancellationToken, Dispatcher, DispatcherConfig, MaintenanceScheduler, SchedulerConfig};
use kb_types::{ChangeKind, ChangeNotification, Settings};

use crate::simulate::{run_simulation, SimulationParams};

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    debounce_override: Option<u64>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(level) = log_level_override {
        settings.log_level = level.to_string();
    }
    if let Some(secs) = debounce_override {
        settings.queue.debounce_window_secs = secs;
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for command output.
fn init_tracing(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Parse one stdin line into a notification.
///
/// Accepts `<event-name> <object-key>` or a bare key (treated as created).
/// Blank lines and `#` comments yield `None`.
pub fn parse_notification_line(line: &str) -> Option<ChangeNotification> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let now = Utc::now();
    match line.split_once(char::is_whitespace) {
        Some((event, key)) => match ChangeKind::from_event_name(event) {
            Some(kind) => Some(ChangeNotification::new(key.trim(), kind, now)),
            None => Some(ChangeNotification::created(line, now)),
        },
        None => Some(ChangeNotification::created(line, now)),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Run the pipeline until interrupted.
pub async fn run_pipeline(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    debounce_override: Option<u64>,
    job_duration_secs: u64,
) -> Result<()> {
    let settings = load_settings(config_path, log_level_override, debounce_override)?;
    init_tracing(&settings.log_level)?;

    let target = settings.index.target();
    info!("kb-sync starting...");
    info!("  Index target: {}", target);
    info!("  Debounce window: {}s", settings.queue.debounce_window_secs);
    info!("  Retry delay: {}s", settings.coordinator.retry_delay_secs);

    let queue = Arc::new(BufferingQueue::with_system_clock(QueueConfig::from(
        &settings.queue,
    )));
    let ingestion = Arc::new(
        InMemoryIngestionService::with_system_clock()
            .with_job_duration(Duration::from_secs(job_duration_secs)),
    );
    let coordinator = Coordinator::new(
        ingestion.clone(),
        queue.clone(),
        ingestion.clone(),
        CoordinatorConfig::from_settings(&settings),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        queue.clone(),
        coordinator,
        DispatcherConfig::from(&settings.dispatcher),
    ));

    let mut scheduler = MaintenanceScheduler::new(SchedulerConfig::from(&settings.maintenance))
        .await
        .context("Failed to create maintenance scheduler")?;
    let prune = DeadLetterPruneJob::new(
        queue.clone(),
        DeadLetterPruneJobConfig::from(&settings.maintenance),
    );
    register_dead_letter_prune_job(&scheduler, prune)
        .await
        .context("Failed to register dead-letter prune job")?;
    scheduler
        .start()
        .await
        .context("Failed to start maintenance scheduler")?;

    let shutdown = CancellationToken::new();
    let dispatch_task = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        async move { dispatcher.run(shutdown).await }
    });

    let feed_task = tokio::spawn({
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) => {
                        let Some(notification) = parse_notification_line(&line) else {
                            continue;
                        };
                        debug!(key = %notification.object_key, kind = %notification.kind, "Change received");
                        if let Err(e) = queue.send(notification).await {
                            warn!(error = %e, "Failed to enqueue notification");
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed, no further notifications");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
        }
    });

    shutdown_signal().await;
    shutdown.cancel();

    if let Err(e) = dispatch_task.await {
        warn!(error = %e, "Dispatcher task ended abnormally");
    }
    feed_task.abort();
    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Maintenance scheduler shutdown failed");
    }

    let stats = dispatcher.registry().snapshot();
    info!(
        invocations = stats.invocations,
        jobs_started = stats.jobs_started,
        retries_scheduled = stats.retries_scheduled,
        failures = stats.failures,
        "kb-sync stopped"
    );
    Ok(())
}

/// Run a simulation and print its report as JSON on stdout.
pub async fn simulate(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    debounce_override: Option<u64>,
    params: SimulationParams,
) -> Result<()> {
    let settings = load_settings(config_path, log_level_override, debounce_override)?;
    init_tracing(&settings.log_level)?;

    info!(
        notifications = params.notifications,
        spacing_ms = params.spacing.as_millis() as u64,
        job_duration_secs = params.job_duration.as_secs(),
        horizon_secs = params.horizon.as_secs(),
        "Running simulation"
    );
    let report = run_simulation(&settings, &params).await;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

/// Print the effective configuration as TOML.
pub fn show_config(config_path: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, None, None)?;
    let rendered = toml::to_string_pretty(&settings).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_event_line() {
        let n = parse_notification_line("ObjectCreated:Put docs/guide.pdf").unwrap();
        assert_eq!(n.object_key, "docs/guide.pdf");
        assert_eq!(n.kind, ChangeKind::Created);

        let n = parse_notification_line("ObjectRemoved:Delete  old/notes.txt ").unwrap();
        assert_eq!(n.object_key, "old/notes.txt");
        assert_eq!(n.kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_parse_bare_key() {
        let n = parse_notification_line("reports/q3.xlsx").unwrap();
        assert_eq!(n.object_key, "reports/q3.xlsx");
        assert_eq!(n.kind, ChangeKind::Created);
    }

    #[test]
    fn test_parse_key_with_spaces_and_unknown_event() {
        let n = parse_notification_line("My Documents/plan.docx").unwrap();
        assert_eq!(n.object_key, "My Documents/plan.docx");
        assert_eq!(n.kind, ChangeKind::Created);
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert!(parse_notification_line("").is_none());
        assert!(parse_notification_line("   ").is_none());
        assert!(parse_notification_line("# header").is_none());
    }

    #[test]
    fn test_load_settings_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[queue]\ndebounce_window_secs = 90").unwrap();
        let path = file.path().to_str().unwrap();

        let settings = load_settings(Some(path), Some("debug"), None).unwrap();
        assert_eq!(settings.queue.debounce_window_secs, 90);
        assert_eq!(settings.log_level, "debug");

        let settings = load_settings(Some(path), None, Some(5)).unwrap();
        assert_eq!(settings.queue.debounce_window_secs, 5);
    }

    #[test]
    fn test_cli_override_replaces_out_of_range_file_value() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[queue]\ndebounce_window_secs = 400").unwrap();
        let path = file.path().to_str().unwrap();

        let settings = load_settings(Some(path), None, Some(5)).unwrap();
        assert_eq!(settings.queue.debounce_window_secs, 5);

        let err = load_settings(Some(path), None, None).unwrap_err();
        assert!(format!("{:#}", err).contains("debounce_window_secs"));
    }

    #[test]
    fn test_load_settings_rejects_invalid_override() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let path = file.path().to_str().unwrap();

        let err = load_settings(Some(path), None, Some(301)).unwrap_err();
        assert!(format!("{:#}", err).contains("debounce_window_secs"));
    }

    #[test]
    fn test_settings_render_as_toml() {
        let rendered = toml::to_string_pretty(&Settings::default()).unwrap();
        assert!(rendered.contains("[queue]"));
        assert!(rendered.contains("retry_delay_secs = 300"));
    }
}
