//! Common utilities for integration tests.
//!
//! Provides:
//! - A recording engine that timestamps every cycle
//! - Driver configurations with the interrupt handler disabled
//! - Polling helpers with deadlines

#![allow(dead_code)] // Not every test module uses every helper

use scan_common::config::{DriverConfig, OverrunPolicy};
use scan_common::error::{ScanError, ScanResult};
use scan_runtime::engine::ScanEngine;
use scan_runtime::tick::TickContext;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Engine that records when each cycle ran and publishes its tick count.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    tick: AtomicI64,
    cycles: Mutex<Vec<Instant>>,
    running: AtomicUsize,
    peak_concurrency: AtomicUsize,
    work: Duration,
    fail_init: Option<i32>,
    initialized: AtomicBool,
    cleaned_up: AtomicBool,
    init_args: Mutex<Vec<String>>,
}

impl RecordingEngine {
    /// Engine whose cycles return immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose cycles sleep for `work`.
    pub fn with_work(work: Duration) -> Self {
        Self {
            work,
            ..Self::default()
        }
    }

    /// Engine whose init fails with `code`.
    pub fn failing(code: i32) -> Self {
        Self {
            fail_init: Some(code),
            ..Self::default()
        }
    }

    /// Start instants of all cycles so far.
    pub fn cycle_starts(&self) -> Vec<Instant> {
        self.cycles.lock().unwrap().clone()
    }

    /// Number of cycles so far.
    pub fn cycle_count(&self) -> usize {
        self.cycles.lock().unwrap().len()
    }

    /// Most cycles observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_concurrency.load(Ordering::SeqCst)
    }

    /// Whether init succeeded.
    pub fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether cleanup ran.
    pub fn cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    /// Arguments passed to the last init.
    pub fn init_args(&self) -> Vec<String> {
        self.init_args.lock().unwrap().clone()
    }
}

impl ScanEngine for RecordingEngine {
    fn init(&self, args: &[String]) -> ScanResult<()> {
        *self.init_args.lock().unwrap() = args.to_vec();
        if let Some(code) = self.fail_init {
            return Err(ScanError::EngineInit {
                code,
                reason: "rejected by test engine".into(),
            });
        }
        self.initialized.store(true, Ordering::SeqCst);
        self.cleaned_up.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn run_cycle(&self, ctx: &TickContext) {
        self.cycles.lock().unwrap().push(Instant::now());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_concurrency.fetch_max(now, Ordering::SeqCst);

        if !self.work.is_zero() {
            thread::sleep(self.work);
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.debug().publish(tick);
    }

    fn cleanup(&self) {
        self.cleaned_up.store(true, Ordering::SeqCst);
    }
}

/// Configuration with the given period and offset, interrupts left alone.
pub fn driver_config(period_ms: i64, first_fire: Duration) -> DriverConfig {
    DriverConfig {
        base_period_ms: period_ms,
        first_fire_offset: Some(first_fire),
        install_interrupt_handler: false,
        supervisor_poll: Duration::from_millis(5),
        ..DriverConfig::default()
    }
}

/// Like [`driver_config`] with an overrun policy.
pub fn policy_config(period_ms: i64, policy: OverrunPolicy) -> DriverConfig {
    DriverConfig {
        overrun_policy: policy,
        ..driver_config(period_ms, Duration::from_millis(period_ms.max(1).unsigned_abs()))
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Assert `actual` lies within `tolerance` of `expected`.
pub fn assert_near(actual: Duration, expected: Duration, tolerance: Duration, what: &str) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= tolerance,
        "{what}: expected {expected:?} +/- {tolerance:?}, got {actual:?}"
    );
}
