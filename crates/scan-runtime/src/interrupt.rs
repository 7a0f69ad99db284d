//! SIGINT/SIGTERM capture for the supervising loop.
//!
//! The handler is async-signal-safe: it stores the signal number into a
//! static atomic and returns. Everything else (the diagnostic, stopping the
//! driver, choosing the exit status) happens on the supervising thread via
//! [`take_pending`].
//!
//! [`install`] returns an [`InterruptGuard`] that puts the previous
//! dispositions back when dropped, so Ctrl-C terminates the process again
//! once the driver has stopped.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use scan_common::error::{ScanError, ScanResult};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, warn};

/// Signals that request a controlled stop.
pub const HANDLED_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

static PENDING: AtomicI32 = AtomicI32::new(0);

extern "C" fn record_signal(signo: libc::c_int) {
    PENDING.store(signo, Ordering::SeqCst);
}

/// A delivered interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    signo: i32,
}

impl Interrupt {
    /// Raw signal number.
    #[must_use]
    pub fn number(&self) -> i32 {
        self.signo
    }

    /// Signal as a typed value, when the number is known to nix.
    #[must_use]
    pub fn signal(&self) -> Option<Signal> {
        Signal::try_from(self.signo).ok()
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal() {
            Some(signal) => write!(f, "{}", signal.as_str()),
            None => write!(f, "signal {}", self.signo),
        }
    }
}

/// Previous signal dispositions, restored on drop.
#[derive(Debug)]
pub struct InterruptGuard {
    previous: Vec<(Signal, SigAction)>,
}

impl InterruptGuard {
    /// Put the previous dispositions back now.
    pub fn restore(self) {
        drop(self);
    }
}

impl Drop for InterruptGuard {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        // Reverse order, in case a signal appears twice.
        for (signal, action) in self.previous.drain(..).rev() {
            // SAFETY: `action` is the disposition that was installed before ours.
            if let Err(e) = unsafe { sigaction(signal, &action) } {
                warn!(%signal, error = %e, "Could not restore signal disposition");
            }
        }
        debug!(signals = ?HANDLED_SIGNALS, "Interrupt handler removed");
    }
}

/// Install the recording handler for SIGINT and SIGTERM.
///
/// Any interrupt recorded earlier is discarded. The previous dispositions
/// come back when the returned guard is dropped.
///
/// # Errors
///
/// Returns [`ScanError::Signal`] if `sigaction` is refused. Signals already
/// switched over are restored before returning.
#[allow(unsafe_code)]
pub fn install() -> ScanResult<InterruptGuard> {
    let action = SigAction::new(
        SigHandler::Handler(record_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    PENDING.store(0, Ordering::SeqCst);

    let mut guard = InterruptGuard {
        previous: Vec::with_capacity(HANDLED_SIGNALS.len()),
    };
    for signal in HANDLED_SIGNALS {
        // SAFETY: the handler only performs an atomic store.
        let previous = unsafe { sigaction(signal, &action) }
            .map_err(|e| ScanError::Signal(format!("sigaction({signal}) failed: {e}")))?;
        guard.previous.push((signal, previous));
    }
    debug!(signals = ?HANDLED_SIGNALS, "Interrupt handler installed");
    Ok(guard)
}

/// Take the most recent interrupt, clearing it.
pub fn take_pending() -> Option<Interrupt> {
    match PENDING.swap(0, Ordering::SeqCst) {
        0 => None,
        signo => Some(Interrupt { signo }),
    }
}

/// Serializes tests that install handlers or raise signals.
#[cfg(test)]
pub(crate) static SIGNAL_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
