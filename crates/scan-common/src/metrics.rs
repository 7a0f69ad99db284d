//! Cycle execution metrics and tick dispatch statistics.
//!
//! [`CycleMetrics`] keeps a ring buffer of engine cycle durations without
//! allocating after construction. [`TickStats`] is the serializable view
//! of the dispatcher counters.

use serde::Serialize;
use std::time::Duration;

/// Engine cycle execution times with a ring buffer for percentiles.
#[derive(Debug)]
pub struct CycleMetrics {
    /// Ring buffer of cycle durations in nanoseconds.
    samples: Box<[u64]>,
    write_pos: usize,
    /// Number of valid samples (saturates at buffer size).
    sample_count: usize,
    total_cycles: u64,
    min_ns: u64,
    max_ns: u64,
    sum_ns: u64,
    /// Cycles that ran longer than one tick period.
    long_cycles: u64,
    period_ns: u64,
}

impl CycleMetrics {
    /// Create a collector keeping `histogram_size` samples.
    ///
    /// Cycles longer than `period` are counted as long cycles: they are the
    /// ones that can make the next firing overrun.
    #[must_use]
    pub fn new(histogram_size: usize, period: Duration) -> Self {
        let size = histogram_size.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total_cycles: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
            long_cycles: 0,
            period_ns: u64::try_from(period.as_nanos()).unwrap_or(u64::MAX),
        }
    }

    /// Record one cycle execution time.
    pub fn record(&mut self, duration: Duration) {
        self.record_ns(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX));
    }

    /// Record a cycle execution time in nanoseconds.
    pub fn record_ns(&mut self, ns: u64) {
        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = (self.sample_count + 1).min(self.samples.len());

        self.total_cycles += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns = self.sum_ns.wrapping_add(ns);

        if ns > self.period_ns {
            self.long_cycles += 1;
        }
    }

    /// Total cycles recorded.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Cycles that exceeded the tick period.
    #[must_use]
    pub fn long_cycles(&self) -> u64 {
        self.long_cycles
    }

    /// Shortest observed cycle.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.total_cycles > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Longest observed cycle.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.total_cycles > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Mean cycle time.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        (self.total_cycles > 0).then(|| Duration::from_nanos(self.sum_ns / self.total_cycles))
    }

    /// Percentile (0.0 to 100.0) over the retained samples.
    ///
    /// Returns `None` without samples or for an out-of-range percentile.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 || !(0.0..=100.0).contains(&percentile) {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(Duration::from_nanos(sorted[idx.min(sorted.len() - 1)]))
    }

    /// Immutable snapshot for reporting.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let any = self.total_cycles > 0;
        MetricsSnapshot {
            total_cycles: self.total_cycles,
            min_ns: any.then_some(self.min_ns),
            max_ns: any.then_some(self.max_ns),
            mean_ns: any.then(|| self.sum_ns / self.total_cycles),
            p99_ns: self
                .percentile(99.0)
                .and_then(|d| u64::try_from(d.as_nanos()).ok()),
            long_cycles: self.long_cycles,
            sample_count: self.sample_count,
        }
    }
}

/// Immutable snapshot of [`CycleMetrics`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    /// Total cycles executed.
    pub total_cycles: u64,
    /// Minimum cycle time in nanoseconds.
    pub min_ns: Option<u64>,
    /// Maximum cycle time in nanoseconds.
    pub max_ns: Option<u64>,
    /// Mean cycle time in nanoseconds.
    pub mean_ns: Option<u64>,
    /// 99th percentile cycle time in nanoseconds.
    pub p99_ns: Option<u64>,
    /// Cycles longer than the tick period.
    pub long_cycles: u64,
    /// Number of samples in the histogram.
    pub sample_count: usize,
}

impl MetricsSnapshot {
    /// Jitter (max - min) in nanoseconds.
    #[must_use]
    pub fn jitter_ns(&self) -> Option<u64> {
        match (self.min_ns, self.max_ns) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        }
    }
}

/// Counters kept by the tick dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    /// Timer firings delivered to the dispatcher.
    pub fired: u64,
    /// Engine cycles that completed.
    pub executed: u64,
    /// Firings dropped because a cycle was still running (`skip`).
    pub skipped: u64,
    /// Firings dropped because the queue was full (`queue`).
    pub queue_overflows: u64,
    /// Firings run concurrently with another cycle (`overlap`).
    pub overlapped: u64,
    /// Whole periods the timer thread fell behind.
    pub timer_overruns: u64,
}

impl TickStats {
    /// Firings that did not produce a cycle.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.skipped + self.queue_overflows
    }
}
