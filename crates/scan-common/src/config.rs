//! Configuration structures for the scan driver.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for production deployment.

use crate::time::TickPeriod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Top-level driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Base tick period in milliseconds. Values below 1 are clamped to 1.
    pub base_period_ms: i64,

    /// Delay before the first firing. Defaults to one full period.
    #[serde(with = "humantime_serde::option", skip_serializing_if = "Option::is_none")]
    pub first_fire_offset: Option<Duration>,

    /// What to do with a firing that arrives while a cycle is still running.
    pub overrun_policy: OverrunPolicy,

    /// Pending firings kept by the `queue` policy.
    pub queue_depth: usize,

    /// Install the SIGINT/SIGTERM handler when the driver starts.
    pub install_interrupt_handler: bool,

    /// How often the supervising loop checks for interrupts.
    #[serde(with = "humantime_serde")]
    pub supervisor_poll: Duration,

    /// Real-time configuration for the tick worker.
    pub realtime: RealtimeConfig,

    /// Cycle metrics configuration.
    pub metrics: MetricsConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_period_ms: 10,
            first_fire_offset: None,
            overrun_policy: OverrunPolicy::default(),
            queue_depth: 4,
            install_interrupt_handler: true,
            supervisor_poll: Duration::from_millis(50),
            realtime: RealtimeConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Effective tick period after clamping.
    #[must_use]
    pub fn tick_period(&self) -> TickPeriod {
        TickPeriod::from_base_millis(self.base_period_ms)
    }

    /// Effective delay before the first firing.
    #[must_use]
    pub fn effective_first_fire_offset(&self) -> Duration {
        match self.first_fire_offset {
            Some(offset) if !offset.is_zero() => offset,
            _ => self.tick_period().as_duration(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "Read driver configuration");
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        if config.base_period_ms < 1 {
            warn!(
                base_period_ms = config.base_period_ms,
                period = %config.tick_period(),
                "Non-positive base period clamped"
            );
        }
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Policy for firings that arrive while the previous cycle is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverrunPolicy {
    /// Drop the firing and count it (at most one cycle in flight).
    #[default]
    Skip,
    /// Queue the firing behind the running cycle, up to `queue_depth`.
    Queue,
    /// Run the firing concurrently on an extra thread.
    Overlap,
}

impl fmt::Display for OverrunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Queue => write!(f, "queue"),
            Self::Overlap => write!(f, "overlap"),
        }
    }
}

/// Real-time scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Enable real-time scheduling (requires privileges).
    pub enabled: bool,

    /// Scheduler policy: "fifo", "rr" or "other".
    pub policy: SchedPolicy,

    /// Scheduler priority (1-99 for RT policies).
    pub priority: u8,

    /// CPU affinity for the tick worker.
    pub cpu_affinity: CpuAffinity,

    /// Lock all memory pages (mlockall) at start.
    pub lock_memory: bool,

    /// Fail `start` instead of warning when RT setup is refused.
    pub fail_fast: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: SchedPolicy::Fifo,
            priority: 80,
            cpu_affinity: CpuAffinity::None,
            lock_memory: true,
            fail_fast: false,
        }
    }
}

/// Scheduler policy for real-time threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: First-in-first-out real-time.
    #[default]
    Fifo,
    /// SCHED_RR: Round-robin real-time.
    Rr,
    /// SCHED_OTHER: Normal time-sharing (non-RT).
    Other,
}

/// CPU affinity specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No affinity set (OS chooses).
    #[default]
    None,
    /// Pin to a single CPU core.
    Single(usize),
    /// Pin to a set of CPU cores.
    Set(Vec<usize>),
}

impl CpuAffinity {
    /// CPUs named by this affinity, empty for [`CpuAffinity::None`].
    #[must_use]
    pub fn cpus(&self) -> Vec<usize> {
        match self {
            Self::None => Vec::new(),
            Self::Single(cpu) => vec![*cpu],
            Self::Set(cpus) => cpus.clone(),
        }
    }
}

impl Serialize for CpuAffinity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            CpuAffinity::None => serializer.serialize_none(),
            CpuAffinity::Single(cpu) => serializer.serialize_u64(*cpu as u64),
            CpuAffinity::Set(cpus) => cpus.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CpuAffinity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct AffinityVisitor;

        impl<'de> Visitor<'de> for AffinityVisitor {
            type Value = CpuAffinity;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("null, a CPU index, or an array of CPU indices")
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(CpuAffinity::None)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(CpuAffinity::None)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                usize::try_from(value)
                    .map(CpuAffinity::Single)
                    .map_err(|_| de::Error::custom("CPU index out of range"))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                usize::try_from(value)
                    .map(CpuAffinity::Single)
                    .map_err(|_| de::Error::custom("CPU index cannot be negative"))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut cpus = Vec::new();
                while let Some(cpu) = seq.next_element::<usize>()? {
                    cpus.push(cpu);
                }
                Ok(CpuAffinity::Set(cpus))
            }
        }

        deserializer.deserialize_any(AffinityVisitor)
    }
}

/// Cycle metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Record per-cycle execution times.
    pub enabled: bool,

    /// Size of the execution-time ring buffer.
    pub histogram_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_size: 10_000,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helpers for `Duration` fields written in humantime format ("10ms").
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
