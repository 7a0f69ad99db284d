//! Tick period and wall-clock timestamp types.
//!
//! Both are kept as a (seconds, nanoseconds) pair, matching the layout
//! the OS timer and clock interfaces use.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_MILLI: u64 = 1_000_000;

/// Period between two consecutive ticks.
///
/// Never shorter than one millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TickPeriod {
    secs: u64,
    nanos: u32,
}

impl TickPeriod {
    /// Smallest period the driver accepts.
    pub const MIN: TickPeriod = TickPeriod {
        secs: 0,
        nanos: NANOS_PER_MILLI as u32,
    };

    /// Build a period from the configured base period in milliseconds.
    ///
    /// Zero and negative values are clamped to [`TickPeriod::MIN`].
    #[must_use]
    pub fn from_base_millis(millis: i64) -> Self {
        let millis = u64::try_from(millis.max(1)).unwrap_or(1);
        Self::split(millis.saturating_mul(NANOS_PER_MILLI))
    }

    /// Build a period from a [`Duration`], clamped to [`TickPeriod::MIN`].
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self::split(nanos.max(NANOS_PER_MILLI))
    }

    fn split(nanos: u64) -> Self {
        Self {
            secs: nanos / NANOS_PER_SEC,
            nanos: (nanos % NANOS_PER_SEC) as u32,
        }
    }

    /// Whole seconds.
    #[must_use]
    pub fn secs(&self) -> u64 {
        self.secs
    }

    /// Sub-second nanoseconds.
    #[must_use]
    pub fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// Total period in nanoseconds.
    #[must_use]
    pub fn as_nanos(&self) -> u64 {
        self.secs
            .saturating_mul(NANOS_PER_SEC)
            .saturating_add(u64::from(self.nanos))
    }

    /// Period as a [`Duration`].
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::new(self.secs, self.nanos)
    }
}

impl Default for TickPeriod {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for TickPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.as_duration()))
    }
}

/// Wall-clock timestamp sampled at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub secs: i64,
    /// Nanoseconds within the second.
    pub nanos: u32,
}

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp { secs: 0, nanos: 0 };

    /// Create a timestamp, normalizing `nanos` into the seconds field.
    #[must_use]
    pub fn new(secs: i64, nanos: u64) -> Self {
        let carry = i64::try_from(nanos / NANOS_PER_SEC).unwrap_or(i64::MAX);
        Self {
            secs: secs.saturating_add(carry),
            nanos: (nanos % NANOS_PER_SEC) as u32,
        }
    }

    /// Rebuild a timestamp from nanoseconds since the epoch.
    #[must_use]
    pub fn from_unix_nanos(nanos: i64) -> Self {
        let secs = nanos.div_euclid(NANOS_PER_SEC as i64);
        let sub = nanos.rem_euclid(NANOS_PER_SEC as i64);
        Self {
            secs,
            nanos: sub as u32,
        }
    }

    /// Nanoseconds since the epoch, saturating at the `i64` range.
    #[must_use]
    pub fn as_unix_nanos(&self) -> i64 {
        self.secs
            .saturating_mul(NANOS_PER_SEC as i64)
            .saturating_add(i64::from(self.nanos))
    }

    /// Signed distance `self - earlier`, or `None` if `earlier` is later.
    #[must_use]
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        let delta = self.as_unix_nanos().checked_sub(earlier.as_unix_nanos())?;
        u64::try_from(delta).ok().map(Duration::from_nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}
