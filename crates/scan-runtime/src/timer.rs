//! Periodic timer with its own firing thread.
//!
//! A [`TimerDriver`] owns one thread that sleeps until the next absolute
//! deadline and then invokes the firing callback. Arming and disarming are
//! messages on a control channel, so they never block on a firing in
//! progress and a disarm does not cancel one that already started.
//!
//! Semantics follow `timer_settime`:
//! - a zero first-fire offset disarms the timer,
//! - a zero period with a non-zero offset fires once,
//! - deadlines advance by exactly one period (`next = previous + period`),
//!   and periods the thread slept through are reported as `missed` on the
//!   next firing instead of being replayed,
//! - a deadline past the range of [`Instant`] never arrives: an offset that
//!   large leaves the timer disarmed, a period that large makes it one-shot.
//!
//! Dropping (or [`TimerDriver::destroy`]ing) the driver joins the thread:
//! once it returns, the callback is never invoked again.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use scan_common::error::{ScanError, ScanResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// One delivered timer expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    /// Sequence number since the timer was last armed, starting at 1.
    pub seq: u64,
    /// Deadline this firing was scheduled for.
    pub deadline: Instant,
    /// Further expirations collapsed into this one because the thread woke late.
    pub missed: u64,
}

#[derive(Debug)]
enum Command {
    Arm { first: Duration, period: Duration },
    Shutdown,
}

/// Handle to an OS-thread backed periodic timer.
#[derive(Debug)]
pub struct TimerDriver {
    control: Sender<Command>,
    thread: Option<JoinHandle<()>>,
    armed: Arc<AtomicBool>,
    name: String,
}

impl TimerDriver {
    /// Create an unarmed timer whose firings invoke `on_fire`.
    ///
    /// `on_fire` runs on the timer thread, never on the caller's.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::TimerCreate`] if the timer thread cannot be spawned.
    pub fn create<F>(name: &str, on_fire: F) -> ScanResult<Self>
    where
        F: FnMut(Firing) + Send + 'static,
    {
        let (control, commands) = crossbeam_channel::unbounded();
        let armed = Arc::new(AtomicBool::new(false));
        let thread_armed = Arc::clone(&armed);

        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || run_timer(&commands, &thread_armed, on_fire))
            .map_err(|e| ScanError::TimerCreate(format!("failed to spawn {name}: {e}")))?;

        debug!(timer = name, "Timer created");
        Ok(Self {
            control,
            thread: Some(thread),
            armed,
            name: name.to_owned(),
        })
    }

    /// Fire first after `first`, then every `period`.
    ///
    /// Re-arming replaces the previous schedule.
    pub fn arm(&self, first: Duration, period: Duration) {
        debug!(
            timer = %self.name,
            first_us = first.as_micros(),
            period_us = period.as_micros(),
            "Arming timer"
        );
        // The timer thread clears this when a one-shot expires.
        self.armed.store(!first.is_zero(), Ordering::Release);
        if self.control.send(Command::Arm { first, period }).is_err() {
            warn!(timer = %self.name, "Timer thread is gone, arm ignored");
        }
    }

    /// Stop future firings. A firing already in progress is not cancelled.
    pub fn disarm(&self) {
        self.arm(Duration::ZERO, Duration::ZERO);
    }

    /// Nanosecond form of [`TimerDriver::arm`]; `(0, 0)` disarms.
    ///
    /// Negative values are treated as zero.
    pub fn set_timer(&self, first_ns: i64, period_ns: i64) {
        let to_duration = |ns: i64| Duration::from_nanos(u64::try_from(ns).unwrap_or(0));
        self.arm(to_duration(first_ns), to_duration(period_ns));
    }

    /// Whether a schedule is currently installed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Disarm, stop the timer thread and wait for it to exit.
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.armed.store(false, Ordering::Release);
        // A send error means the thread already exited.
        let _ = self.control.send(Command::Shutdown);
        if thread.join().is_err() {
            warn!(timer = %self.name, "Timer thread panicked");
        }
        debug!(timer = %self.name, "Timer destroyed");
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Active schedule of the timer thread.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    next: Instant,
    period: Duration,
    seq: u64,
}

impl Schedule {
    /// Produce the firing for the deadline that just passed and advance.
    ///
    /// Returns the firing and the following schedule (`None` for one-shot).
    fn expire(self, now: Instant) -> (Firing, Option<Schedule>) {
        let seq = self.seq + 1;
        if self.period.is_zero() {
            let firing = Firing {
                seq,
                deadline: self.next,
                missed: 0,
            };
            return (firing, None);
        }

        let (next, missed) = match self.next.checked_add(self.period) {
            Some(next) if next <= now => {
                let behind = now.duration_since(next).as_nanos() / self.period.as_nanos();
                let missed = u64::try_from(behind).unwrap_or(u64::MAX).saturating_add(1);
                (advance(next, self.period, missed), missed)
            }
            next => (next, 0),
        };

        let firing = Firing {
            seq,
            deadline: self.next,
            missed,
        };
        let following = next.map(|next| Schedule {
            next,
            period: self.period,
            seq,
        });
        (firing, following)
    }
}

/// `from + period * times`, or `None` past the range of [`Instant`].
fn advance(from: Instant, period: Duration, times: u64) -> Option<Instant> {
    let nanos = period.as_nanos().checked_mul(u128::from(times))?;
    let secs = u64::try_from(nanos / 1_000_000_000).ok()?;
    #[allow(clippy::cast_possible_truncation)]
    let subsec = (nanos % 1_000_000_000) as u32;
    from.checked_add(Duration::new(secs, subsec))
}

fn run_timer<F>(commands: &Receiver<Command>, armed: &AtomicBool, mut on_fire: F)
where
    F: FnMut(Firing),
{
    let mut schedule: Option<Schedule> = None;

    loop {
        let received = match schedule {
            Some(s) => commands.recv_deadline(s.next),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Arm { first, period }) => {
                schedule = if first.is_zero() {
                    None
                } else if let Some(next) = Instant::now().checked_add(first) {
                    Some(Schedule {
                        next,
                        period,
                        seq: 0,
                    })
                } else {
                    warn!(first_s = first.as_secs(), "First firing out of range, timer left disarmed");
                    armed.store(false, Ordering::Release);
                    None
                };
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let Some(current) = schedule else { continue };
                let (firing, following) = current.expire(Instant::now());
                schedule = following;
                if schedule.is_none() {
                    armed.store(false, Ordering::Release);
                }
                trace!(seq = firing.seq, missed = firing.missed, "Timer fired");
                on_fire(firing);
            }
        }
    }
}
