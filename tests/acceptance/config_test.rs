//! Configuration file acceptance tests.

use super::common::RecordingEngine;
use scan_common::config::{CpuAffinity, DriverConfig, OverrunPolicy};
use scan_runtime::driver::ScanDriver;
use std::time::Duration;

const CONFIG: &str = r#"
base_period_ms = 500
first_fire_offset = "1s"
overrun_policy = "overlap"
queue_depth = 8
install_interrupt_handler = false
supervisor_poll = "20ms"

[realtime]
enabled = true
policy = "rr"
priority = 60
cpu_affinity = [0, 1]
fail_fast = false

[metrics]
enabled = false
"#;

#[test]
fn test_driver_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let config = DriverConfig::from_file(&path).unwrap();
    assert_eq!(config.overrun_policy, OverrunPolicy::Overlap);
    assert_eq!(config.effective_first_fire_offset(), Duration::from_secs(1));
    assert_eq!(config.supervisor_poll, Duration::from_millis(20));
    assert_eq!(config.realtime.cpu_affinity, CpuAffinity::Set(vec![0, 1]));

    let driver = ScanDriver::new(RecordingEngine::new(), config);
    assert_eq!(driver.period().as_duration(), Duration::from_millis(500));
    assert!(driver.cycle_metrics().is_none());
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "overrun_policy = \"sometimes\"\n").unwrap();

    assert!(DriverConfig::from_file(&path).is_err());
}

#[test]
fn test_stats_serialize_to_json() {
    let config = DriverConfig {
        install_interrupt_handler: false,
        ..DriverConfig::default()
    };
    let driver = ScanDriver::new(RecordingEngine::new(), config);

    let json = serde_json::to_value(driver.stats()).unwrap();
    for key in ["fired", "executed", "skipped", "queue_overflows", "overlapped", "timer_overruns"] {
        assert_eq!(json[key], 0, "{key}");
    }
}
