//! End-of-run report for the scan daemon.
//!
//! Combines the dispatcher counters and cycle metrics into one snapshot
//! that is logged on exit and optionally printed as JSON.

use scan_common::metrics::{MetricsSnapshot, TickStats};
use scan_common::state::DriverState;
use scan_runtime::driver::StopReason;
use serde::Serialize;
use std::time::Duration;

/// Health of a run, judged from the dispatcher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every firing produced a cycle.
    Healthy,
    /// More than 1% of firings were dropped or ran late.
    Degraded,
    /// No firing was ever delivered.
    Idle,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Idle => write!(f, "idle"),
        }
    }
}

impl HealthStatus {
    /// Classify a run from its counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_stats(stats: &TickStats) -> Self {
        if stats.fired == 0 {
            return HealthStatus::Idle;
        }
        let late = stats.dropped() + stats.timer_overruns + stats.overlapped;
        if late as f64 / stats.fired as f64 > 0.01 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Snapshot of one daemon run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Classified health.
    pub health: HealthStatus,
    /// Driver state at the time of the report.
    pub state: DriverState,
    /// Why supervision ended.
    pub stop_reason: String,
    /// Tick period in nanoseconds.
    pub period_ns: u64,
    /// Wall time from start to report.
    pub uptime_ms: u64,
    /// Dispatcher counters.
    pub ticks: TickStats,
    /// Cycle execution times, when metrics are enabled.
    pub cycles: Option<MetricsSnapshot>,
    /// Ticks seen by the debug watcher, when one was attached.
    pub debug_ticks_observed: Option<u64>,
}

impl RunReport {
    /// Assemble a report.
    #[must_use]
    pub fn new(
        state: DriverState,
        reason: StopReason,
        period: Duration,
        uptime: Duration,
        ticks: TickStats,
        cycles: Option<MetricsSnapshot>,
    ) -> Self {
        Self {
            health: HealthStatus::from_stats(&ticks),
            state,
            stop_reason: describe(reason),
            period_ns: u64::try_from(period.as_nanos()).unwrap_or(u64::MAX),
            uptime_ms: u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX),
            ticks,
            cycles,
            debug_ticks_observed: None,
        }
    }

    /// Record how many ticks the debug watcher observed.
    #[must_use]
    pub fn with_debug_ticks(mut self, observed: u64) -> Self {
        self.debug_ticks_observed = Some(observed);
        self
    }

    /// Pretty JSON rendering.
    ///
    /// # Errors
    ///
    /// Only fails if serialization itself fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn describe(reason: StopReason) -> String {
    match reason {
        StopReason::Interrupted(signal) => format!("interrupted by {signal}"),
        StopReason::TimeLimit => "time limit reached".to_owned(),
        StopReason::NotRunning => "not running".to_owned(),
    }
}
