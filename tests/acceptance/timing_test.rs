//! Tick timing acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - First cycle runs after the first-fire offset
//! - Later cycles follow at the tick period without drift
//! - No cycle runs once `stop` has returned

use super::common::{assert_near, driver_config, wait_until, RecordingEngine};
use scan_runtime::driver::ScanDriver;
use std::thread;
use std::time::{Duration, Instant};

const TOLERANCE: Duration = Duration::from_millis(120);

#[test]
fn test_offset_then_period_then_stop() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(500, Duration::from_secs(1)),
    );

    let started = Instant::now();
    driver.start(&[]).unwrap();

    thread::sleep(Duration::from_millis(2600).saturating_sub(started.elapsed()));
    driver.stop().unwrap();
    let stopped = Instant::now();

    thread::sleep(Duration::from_millis(600));

    let starts = driver.engine().cycle_starts();
    assert_eq!(starts.len(), 4, "cycles at {starts:?}");
    for (i, at) in starts.iter().enumerate() {
        let expected = Duration::from_millis(1000 + 500 * i as u64);
        assert_near(at.duration_since(started), expected, TOLERANCE, &format!("cycle {i}"));
    }
    assert!(starts.iter().all(|at| *at < stopped));
}

#[test]
fn test_default_first_fire_is_one_period() {
    let mut config = driver_config(200, Duration::ZERO);
    config.first_fire_offset = None;
    let mut driver = ScanDriver::new(RecordingEngine::new(), config);

    let started = Instant::now();
    driver.start(&[]).unwrap();
    assert!(wait_until(Duration::from_secs(2), || driver.engine().cycle_count() >= 1));
    driver.stop().unwrap();

    let first = driver.engine().cycle_starts()[0];
    assert_near(first.duration_since(started), Duration::from_millis(200), TOLERANCE, "first cycle");
}

#[test]
fn test_short_period_rate() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(10, Duration::from_millis(10)),
    );

    driver.start(&[]).unwrap();
    thread::sleep(Duration::from_millis(505));
    driver.stop().unwrap();

    // 50 expected; allow for scheduling noise and skipped firings.
    let cycles = driver.engine().cycle_count();
    assert!((35..=52).contains(&cycles), "{cycles} cycles in 505ms");

    let stats = driver.stats();
    assert_eq!(stats.executed, cycles as u64);
    assert_eq!(stats.fired, stats.executed + stats.dropped());
}

#[test]
fn test_zero_period_is_clamped_to_one_millisecond() {
    let mut driver = ScanDriver::new(RecordingEngine::new(), driver_config(0, Duration::from_millis(1)));
    assert_eq!(driver.period().as_duration(), Duration::from_millis(1));

    driver.start(&[]).unwrap();
    thread::sleep(Duration::from_millis(100));
    driver.stop().unwrap();

    let cycles = driver.engine().cycle_count();
    assert!(cycles > 20 && cycles <= 101, "{cycles} cycles in 100ms");
}

#[test]
fn test_current_time_tracks_ticks() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(20, Duration::from_millis(20)),
    );
    driver.start(&[]).unwrap();
    assert!(wait_until(Duration::from_secs(2), || driver.engine().cycle_count() >= 2));
    let first = driver.current_time();

    assert!(wait_until(Duration::from_secs(2), || driver.engine().cycle_count() >= 5));
    let later = driver.current_time();
    driver.stop().unwrap();

    let advanced = later.duration_since(first).unwrap();
    assert!(advanced >= Duration::from_millis(20), "advanced {advanced:?}");

    // Stale between ticks: it reflects the last tick, not the read.
    let frozen = driver.current_time();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(driver.current_time(), frozen);
}
