//! Interface to the control-logic engine driven by the ticks.

use crate::tick::TickContext;
use scan_common::error::ScanResult;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{debug, info};

/// Control-logic engine executed once per tick.
///
/// All methods take `&self`: under the `overlap` overrun policy two cycles
/// may run at the same time, so implementations keep their own state
/// behind atomics or locks.
pub trait ScanEngine: Send + Sync + 'static {
    /// Prepare the engine. Called once by `start`, before the timer is armed.
    ///
    /// # Errors
    ///
    /// Any error aborts `start`; return
    /// [`ScanError::EngineInit`](scan_common::error::ScanError::EngineInit)
    /// to choose the reported status code.
    fn init(&self, args: &[String]) -> ScanResult<()>;

    /// Execute one scan cycle.
    ///
    /// Runs on the tick context after the current time has been sampled.
    /// Engines with a debugger attached publish their tick counter through
    /// [`TickContext::debug`] at the end of the cycle.
    fn run_cycle(&self, ctx: &TickContext);

    /// Release engine resources. Called by `stop` after the timer is gone.
    fn cleanup(&self);
}

/// Engine that only counts ticks and publishes the count for debuggers.
#[derive(Debug, Default)]
pub struct TickCounterEngine {
    tick: AtomicI64,
    initialized: AtomicBool,
}

impl TickCounterEngine {
    /// Create an engine at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks executed so far.
    #[must_use]
    pub fn tick(&self) -> i64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Whether `init` ran without a matching `cleanup`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

impl ScanEngine for TickCounterEngine {
    fn init(&self, args: &[String]) -> ScanResult<()> {
        info!(?args, "Tick counter engine initialized");
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn run_cycle(&self, ctx: &TickContext) {
        let tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        ctx.debug().publish(tick);
    }

    fn cleanup(&self) {
        debug!(ticks = self.tick(), "Tick counter engine cleaned up");
        self.initialized.store(false, Ordering::Release);
    }
}
