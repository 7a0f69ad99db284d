//! Overrun policy acceptance tests.
//!
//! Every test runs an engine whose cycle (30ms) outlasts the tick period
//! (10ms) so firings keep arriving while a cycle is in progress.

use super::common::{policy_config, RecordingEngine};
use scan_common::config::OverrunPolicy;
use scan_runtime::driver::ScanDriver;
use std::thread;
use std::time::Duration;

const WORK: Duration = Duration::from_millis(30);
const RUN: Duration = Duration::from_millis(400);

fn run(policy: OverrunPolicy, queue_depth: usize) -> ScanDriver<RecordingEngine> {
    let mut config = policy_config(10, policy);
    config.queue_depth = queue_depth;
    let mut driver = ScanDriver::new(RecordingEngine::with_work(WORK), config);
    driver.start(&[]).unwrap();
    thread::sleep(RUN);
    driver.stop().unwrap();
    driver
}

#[test]
fn test_skip_never_overlaps() {
    let driver = run(OverrunPolicy::Skip, 4);
    let stats = driver.stats();

    assert_eq!(driver.engine().peak_concurrency(), 1);
    assert!(stats.skipped > 0, "{stats:?}");
    assert_eq!(stats.overlapped, 0);
    assert_eq!(stats.queue_overflows, 0);
    // Roughly one cycle per 30ms of work.
    assert!(stats.executed <= 15, "{stats:?}");
}

#[test]
fn test_overlap_runs_cycles_concurrently() {
    let driver = run(OverrunPolicy::Overlap, 4);
    let stats = driver.stats();

    assert!(driver.engine().peak_concurrency() >= 2);
    assert!(stats.overlapped > 0, "{stats:?}");
    assert_eq!(stats.skipped, 0);
    // Stop waited for the overlapping threads before cleanup.
    assert!(driver.engine().cleaned_up());
    assert_eq!(stats.executed, driver.engine().cycle_count() as u64);
}

#[test]
fn test_queue_serializes_and_bounds_backlog() {
    let driver = run(OverrunPolicy::Queue, 2);
    let stats = driver.stats();

    assert_eq!(driver.engine().peak_concurrency(), 1);
    assert!(stats.queue_overflows > 0, "{stats:?}");
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.overlapped, 0);
}

#[test]
fn test_stop_discards_queued_firings() {
    let driver = run(OverrunPolicy::Queue, 16);
    let executed = driver.stats().executed;

    thread::sleep(Duration::from_millis(200));
    assert_eq!(driver.stats().executed, executed);
    assert_eq!(driver.engine().cycle_count() as u64, executed);
}
