//! Simulation report as the `simulate` command prints it.

use kb_daemon::simulate::run_simulation;
use kb_daemon::SimulationParams;
use kb_types::Settings;

#[tokio::test]
async fn test_report_json_fields() {
    let mut settings = Settings::default();
    settings.queue.debounce_window_secs = 10;

    let report = run_simulation(&settings, &SimulationParams::new(5, 200, 60, 300)).await;
    let json = serde_json::to_value(&report).unwrap();

    for field in [
        "invocations",
        "jobs_started",
        "retries_scheduled",
        "purges",
        "dead_letters",
        "max_concurrent_jobs",
    ] {
        assert!(json.get(field).is_some(), "missing field {}", field);
    }
    assert_eq!(json["notifications"], 5);
    assert_eq!(json["jobs_started"], 1);
    assert_eq!(json["max_concurrent_jobs"], 1);
    assert_eq!(json["final_depth"]["visible"], 0);
}

#[tokio::test]
async fn test_zero_debounce_with_slow_jobs_still_single_flight() {
    let mut settings = Settings::default();
    settings.queue.debounce_window_secs = 0;

    let report = run_simulation(&settings, &SimulationParams::new(200, 500, 600, 3600)).await;

    assert_eq!(report.max_concurrent_jobs, 1);
    assert_eq!(report.failed_invocations, 0);
    assert!(report.retries_scheduled > 0);
}
