//! Start/stop lifecycle acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A failing engine init yields a nonzero status and no tick ever fires
//! - Stop runs engine cleanup and leaves the driver restartable
//! - SIGINT turns into a controlled stop with a clean exit reason
//! - Real-time setup degrades gracefully without privileges

use super::common::{driver_config, wait_until, RecordingEngine};
use scan_common::config::{RealtimeConfig, SchedPolicy};
use scan_common::error::ScanError;
use scan_common::state::DriverState;
use scan_runtime::driver::{ScanDriver, StopReason};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_failed_init_reports_status_and_never_ticks() {
    let mut driver = ScanDriver::new(
        RecordingEngine::failing(3),
        driver_config(1, Duration::from_millis(1)),
    );

    let err = driver.start(&["--program".into(), "missing.st".into()]).unwrap_err();
    assert!(matches!(err, ScanError::EngineInit { code: 3, .. }));
    assert_ne!(err.status_code(), 0);
    assert_eq!(driver.state(), DriverState::Stopped);
    assert_eq!(driver.engine().init_args(), vec!["--program", "missing.st"]);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(driver.engine().cycle_count(), 0);
    assert_eq!(driver.stats().fired, 0);
    assert!(!driver.engine().cleaned_up());
}

#[test]
fn test_stop_cleans_up_and_restarts() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(5, Duration::from_millis(5)),
    );

    driver.start(&[]).unwrap();
    assert!(driver.engine().initialized());
    assert!(wait_until(Duration::from_secs(2), || driver.engine().cycle_count() >= 3));
    driver.stop().unwrap();
    assert!(driver.engine().cleaned_up());
    assert_eq!(driver.state(), DriverState::Stopped);

    let after_first = driver.engine().cycle_count();
    driver.start(&[]).unwrap();
    assert!(!driver.engine().cleaned_up());
    assert!(wait_until(Duration::from_secs(2), || {
        driver.engine().cycle_count() >= after_first + 3
    }));
    driver.stop().unwrap();
}

#[test]
fn test_double_stop_is_harmless() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(5, Duration::from_millis(5)),
    );
    driver.start(&[]).unwrap();
    driver.stop().unwrap();
    driver.stop().unwrap();
    assert_eq!(driver.state(), DriverState::Stopped);
    assert!(driver.debug_bridge().is_aborted());
}

#[test]
fn test_interrupt_stops_driver() {
    let mut config = driver_config(10, Duration::from_millis(10));
    config.install_interrupt_handler = true;
    let mut driver = ScanDriver::new(RecordingEngine::new(), config);
    driver.start(&[]).unwrap();

    let raiser = thread::spawn(|| {
        thread::sleep(Duration::from_millis(150));
        nix::sys::signal::raise(nix::sys::signal::Signal::SIGINT).unwrap();
    });

    let started = Instant::now();
    let reason = driver.supervise(Some(Duration::from_secs(10))).unwrap();
    raiser.join().unwrap();

    match reason {
        StopReason::Interrupted(signal) => assert_eq!(signal.number(), libc::SIGINT),
        other => panic!("expected an interrupt, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(driver.state(), DriverState::Stopped);
    assert!(driver.engine().cleaned_up());
    assert!(driver.engine().cycle_count() > 0);
}

#[test]
fn test_supervise_run_limit() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(10, Duration::from_millis(10)),
    );
    driver.start(&[]).unwrap();

    let started = Instant::now();
    assert_eq!(
        driver.supervise(Some(Duration::from_millis(200))).unwrap(),
        StopReason::TimeLimit
    );
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_secs(2));
    assert_eq!(driver.state(), DriverState::Stopped);
}

#[test]
fn test_unprivileged_realtime_request_still_starts() {
    let mut config = driver_config(5, Duration::from_millis(5));
    config.realtime = RealtimeConfig {
        enabled: true,
        policy: SchedPolicy::Fifo,
        lock_memory: false,
        fail_fast: false,
        ..RealtimeConfig::default()
    };
    let mut driver = ScanDriver::new(RecordingEngine::new(), config);

    driver.start(&[]).unwrap();
    assert!(wait_until(Duration::from_secs(2), || driver.engine().cycle_count() >= 2));
    driver.stop().unwrap();
}

#[test]
fn test_realtime_other_policy_with_fail_fast() {
    let mut config = driver_config(5, Duration::from_millis(5));
    config.realtime = RealtimeConfig {
        enabled: true,
        policy: SchedPolicy::Other,
        lock_memory: false,
        fail_fast: true,
        ..RealtimeConfig::default()
    };
    let mut driver = ScanDriver::new(RecordingEngine::new(), config);

    driver.start(&[]).unwrap();
    driver.stop().unwrap();
}
