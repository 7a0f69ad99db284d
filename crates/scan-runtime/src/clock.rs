//! Wall-clock sampling and the per-tick current time cell.

use scan_common::time::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Sample the current time.
    fn now(&self) -> Timestamp;
}

/// `CLOCK_REALTIME` clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_os = "linux")]
    fn now(&self) -> Timestamp {
        use nix::time::{clock_gettime, ClockId};

        match clock_gettime(ClockId::CLOCK_REALTIME) {
            Ok(ts) => Timestamp::new(
                i64::from(ts.tv_sec()),
                u64::try_from(ts.tv_nsec()).unwrap_or(0),
            ),
            Err(_) => system_time_now(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn now(&self) -> Timestamp {
        system_time_now()
    }
}

fn system_time_now() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};

    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => Timestamp::new(
            i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            u64::from(d.subsec_nanos()),
        ),
        Err(e) => {
            let d = e.duration();
            Timestamp::from_unix_nanos(-i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        }
    }
}

/// Time of the most recent tick.
///
/// Written by the tick context before every cycle and read by the engine
/// during that cycle. It is not "now": between ticks it goes stale.
#[derive(Debug, Default)]
pub struct CurrentTime {
    unix_nanos: AtomicI64,
}

impl CurrentTime {
    /// Create a cell holding the epoch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample `clock` into the cell and return the sampled value.
    pub fn sample(&self, clock: &dyn Clock) -> Timestamp {
        let now = clock.now();
        self.set(now);
        now
    }

    /// Overwrite the stored timestamp.
    pub fn set(&self, ts: Timestamp) {
        self.unix_nanos.store(ts.as_unix_nanos(), Ordering::Release);
    }

    /// Timestamp of the most recent tick.
    #[must_use]
    pub fn get(&self) -> Timestamp {
        Timestamp::from_unix_nanos(self.unix_nanos.load(Ordering::Acquire))
    }
}
