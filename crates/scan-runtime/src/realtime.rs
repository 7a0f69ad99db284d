//! Real-time setup for the tick worker.
//!
//! - Memory locking (mlockall) so a cycle never takes a page fault
//! - SCHED_FIFO/SCHED_RR priority for the tick worker thread
//! - CPU pinning to keep the worker away from housekeeping cores
//!
//! Scheduler and affinity calls target the calling thread, so the tick
//! worker applies them to itself right after it is spawned.

#![cfg_attr(not(target_os = "linux"), allow(unused_imports))]

use scan_common::config::{CpuAffinity, RealtimeConfig, SchedPolicy};
use scan_common::error::{ScanError, ScanResult};
use tracing::{debug, info, warn};

/// What the real-time setup actually applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealtimeStatus {
    /// Applied scheduler policy.
    pub scheduler_policy: Option<SchedPolicy>,
    /// Applied scheduler priority.
    pub scheduler_priority: Option<u8>,
    /// CPUs the thread is pinned to.
    pub cpu_affinity: Option<Vec<usize>>,
}

/// Apply scheduler policy and CPU affinity to the calling thread.
///
/// # Errors
///
/// Returns [`ScanError::Realtime`] when a setting is refused and
/// `fail_fast` is set. Otherwise refusals are logged and skipped.
pub fn configure_current_thread(config: &RealtimeConfig) -> ScanResult<RealtimeStatus> {
    if !config.enabled {
        return Ok(RealtimeStatus::default());
    }

    let (scheduler_policy, scheduler_priority) =
        refused_unless_fail_fast(config, set_scheduler(config.policy, config.priority))?
            .unwrap_or((None, None));
    let cpu_affinity = refused_unless_fail_fast(config, set_cpu_affinity(&config.cpu_affinity))?
        .flatten();

    let status = RealtimeStatus {
        scheduler_policy,
        scheduler_priority,
        cpu_affinity,
    };
    info!(?status, "Tick worker real-time setup complete");
    Ok(status)
}

/// Lock current and future pages when the configuration asks for it.
///
/// Returns whether memory is now locked.
///
/// # Errors
///
/// Returns [`ScanError::Realtime`] on refusal when `fail_fast` is set.
pub fn lock_memory_if_requested(config: &RealtimeConfig) -> ScanResult<bool> {
    if !config.enabled || !config.lock_memory {
        return Ok(false);
    }
    Ok(refused_unless_fail_fast(config, lock_memory())?.unwrap_or(false))
}

fn refused_unless_fail_fast<T>(
    config: &RealtimeConfig,
    result: ScanResult<T>,
) -> ScanResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if config.fail_fast => Err(e),
        Err(e) => {
            warn!(error = %e, "Real-time setting refused, continuing without it");
            Ok(None)
        }
    }
}

#[cfg(target_os = "linux")]
fn lock_memory() -> ScanResult<bool> {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    debug!("Locking memory pages with mlockall");
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| ScanError::Realtime(format!("mlockall failed: {e}")))?;
    info!("Memory locked");
    Ok(true)
}

#[cfg(not(target_os = "linux"))]
fn lock_memory() -> ScanResult<bool> {
    Err(ScanError::Realtime(
        "mlockall not available on this platform".into(),
    ))
}

#[cfg(target_os = "linux")]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> ScanResult<(Option<SchedPolicy>, Option<u8>)> {
    let linux_policy = match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::Rr => libc::SCHED_RR,
        SchedPolicy::Other => return Ok((Some(SchedPolicy::Other), None)),
    };

    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(original = priority, clamped, "Scheduler priority clamped to 1-99");
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped),
    };
    // SAFETY: pid 0 targets the calling thread and `param` outlives the call.
    let result = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };
    if result == -1 {
        return Err(ScanError::Realtime(format!(
            "sched_setscheduler({policy:?}, {clamped}) failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    debug!(?policy, priority = clamped, "Scheduler configured");
    Ok((Some(policy), Some(clamped)))
}

#[cfg(not(target_os = "linux"))]
fn set_scheduler(
    policy: SchedPolicy,
    _priority: u8,
) -> ScanResult<(Option<SchedPolicy>, Option<u8>)> {
    if policy == SchedPolicy::Other {
        return Ok((Some(SchedPolicy::Other), None));
    }
    Err(ScanError::Realtime(
        "real-time scheduling not available on this platform".into(),
    ))
}

#[cfg(target_os = "linux")]
fn set_cpu_affinity(affinity: &CpuAffinity) -> ScanResult<Option<Vec<usize>>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let cpus = affinity.cpus();
    if cpus.is_empty() {
        return Ok(None);
    }

    let mut cpu_set = CpuSet::new();
    for &cpu in &cpus {
        cpu_set
            .set(cpu)
            .map_err(|e| ScanError::Realtime(format!("invalid CPU index {cpu}: {e}")))?;
    }

    sched_setaffinity(Pid::from_raw(0), &cpu_set)
        .map_err(|e| ScanError::Realtime(format!("sched_setaffinity({cpus:?}) failed: {e}")))?;
    debug!(?cpus, "CPU affinity set");
    Ok(Some(cpus))
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(affinity: &CpuAffinity) -> ScanResult<Option<Vec<usize>>> {
    if affinity.cpus().is_empty() {
        return Ok(None);
    }
    Err(ScanError::Realtime(
        "CPU affinity not available on this platform".into(),
    ))
}
