//! Debug bridge acceptance tests.
//!
//! A debugger thread follows the ticks the engine publishes, sees only the
//! latest one when it falls behind, and is released when the driver stops.

use super::common::{driver_config, wait_until, RecordingEngine};
use scan_runtime::debug_bridge::DEBUG_ABORTED;
use scan_runtime::driver::ScanDriver;
use std::thread;
use std::time::Duration;

#[test]
fn test_debugger_follows_published_ticks() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(10, Duration::from_millis(10)),
    );
    let ctx = driver.context();
    driver.start(&[]).unwrap();

    let debugger = thread::spawn(move || {
        let mut seen = Vec::new();
        loop {
            let tick = ctx.debug().wait();
            if tick == DEBUG_ABORTED {
                return seen;
            }
            seen.push(tick);
        }
    });

    assert!(wait_until(Duration::from_secs(2), || driver.engine().cycle_count() >= 10));
    driver.stop().unwrap();

    let seen = debugger.join().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "ticks not increasing: {seen:?}");
    assert!(*seen.last().unwrap() <= driver.engine().cycle_count() as i64);
}

#[test]
fn test_slow_debugger_only_sees_latest() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(5, Duration::from_millis(5)),
    );
    let ctx = driver.context();
    driver.start(&[]).unwrap();

    let debugger = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(60));
            match ctx.debug().wait_timeout(Duration::from_secs(1)) {
                Some(DEBUG_ABORTED) | None => break,
                Some(tick) => seen.push(tick),
            }
        }
        seen
    });

    let seen = debugger.join().unwrap();
    driver.stop().unwrap();

    assert_eq!(seen.len(), 3);
    // Ticks published while the debugger slept were overwritten.
    assert!(seen.windows(2).all(|w| w[1] - w[0] > 1), "{seen:?}");
}

#[test]
fn test_stop_releases_every_waiter() {
    let mut driver = ScanDriver::new(
        RecordingEngine::new(),
        driver_config(1000, Duration::from_secs(5)),
    );
    driver.start(&[]).unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let ctx = driver.context();
            thread::spawn(move || ctx.debug().wait())
        })
        .collect();

    thread::sleep(Duration::from_millis(100));
    assert!(waiters.iter().all(|w| !w.is_finished()));
    driver.stop().unwrap();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), DEBUG_ABORTED);
    }
    // Still aborted for late arrivals.
    assert_eq!(driver.debug_bridge().wait(), DEBUG_ABORTED);
}
