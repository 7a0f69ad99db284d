//! Single-slot handoff between the tick context and debugger threads.
//!
//! The engine publishes its tick counter after a cycle; a debugger thread
//! waits for the next publication. The slot holds one value only, so a slow
//! reader sees the latest tick and never a backlog. Every publish and abort
//! is broadcast: all waiters woken together observe the same value.
//!
//! Waiting is predicate-based. Each publication bumps a generation counter
//! and `wait` only returns once the generation it saw on entry has moved,
//! so a spurious condvar wakeup can never hand back a stale tick.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Slot value meaning "aborted, no tick available".
pub const DEBUG_ABORTED: i64 = -1;

#[derive(Debug, Default)]
struct Slot {
    tick: i64,
    /// Bumped on every publish and abort.
    generation: u64,
    /// Generation last handed out by `wait`.
    consumed: u64,
    aborted: bool,
}

impl Slot {
    /// Value to hand to a waiter that entered at generation `entered`, if any.
    fn ready(&mut self, entered: u64) -> Option<i64> {
        if self.aborted {
            return Some(DEBUG_ABORTED);
        }
        if self.generation != entered || self.generation != self.consumed {
            self.consumed = self.generation;
            return Some(self.tick);
        }
        None
    }
}

/// Lossy single-slot debug channel.
#[derive(Debug, Default)]
pub struct DebugBridge {
    slot: Mutex<Slot>,
    cond: Condvar,
}

impl DebugBridge {
    /// Create a bridge holding tick 0 with nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot is plain integers, a panicking holder cannot corrupt it.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `tick`, overwriting any unread value, and wake all waiters.
    pub fn publish(&self, tick: i64) {
        let mut slot = self.lock();
        slot.tick = tick;
        slot.aborted = false;
        slot.generation = slot.generation.wrapping_add(1);
        trace!(tick, generation = slot.generation, "Debug tick published");
        self.cond.notify_all();
    }

    /// Block until a tick is published or the bridge is aborted.
    ///
    /// Returns immediately with a publication no `wait` has returned yet.
    /// Returns [`DEBUG_ABORTED`] after [`DebugBridge::abort`] until the next
    /// publish.
    pub fn wait(&self) -> i64 {
        let mut slot = self.lock();
        let entered = slot.generation;
        loop {
            if let Some(tick) = slot.ready(entered) {
                return tick;
            }
            slot = self
                .cond
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`DebugBridge::wait`], but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<i64> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        let entered = slot.generation;
        loop {
            if let Some(tick) = slot.ready(entered) {
                return Some(tick);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .cond
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Force the slot to [`DEBUG_ABORTED`] and release every waiter.
    pub fn abort(&self) {
        let mut slot = self.lock();
        slot.tick = DEBUG_ABORTED;
        slot.aborted = true;
        slot.generation = slot.generation.wrapping_add(1);
        debug!("Debug bridge aborted");
        self.cond.notify_all();
    }

    /// Current slot value without waiting or consuming it.
    #[must_use]
    pub fn latest(&self) -> i64 {
        self.lock().tick
    }

    /// Whether the bridge is in the aborted state.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }
}

static_assertions::assert_impl_all!(DebugBridge: Send, Sync);
