//! Lifecycle controller: start, stop, and supervision of a scan driver.
//!
//! `start` initializes the engine and arms the periodic timer; every firing
//! then runs one engine cycle on the tick worker. `stop` tears this down in
//! a fixed order:
//!
//! 1. Disarm the timer and destroy it (joins the timer thread)
//! 2. Halt the tick worker, letting a cycle in flight finish
//! 3. Engine cleanup
//! 4. Abort the debug bridge, releasing every debugger thread
//! 5. Restore the signal dispositions that `start` replaced
//!
//! [`ScanDriver::supervise`] is the control thread's main loop: it turns a
//! recorded SIGINT/SIGTERM or an elapsed run limit into a controlled stop.

use crate::clock::{Clock, SystemClock};
use crate::debug_bridge::DebugBridge;
use crate::engine::ScanEngine;
use crate::interrupt::{self, Interrupt, InterruptGuard};
use crate::realtime;
use crate::tick::{TickCallback, TickContext, TickWorker};
use crate::timer::TimerDriver;
use scan_common::config::{DriverConfig, OverrunPolicy};
use scan_common::error::{ScanError, ScanResult};
use scan_common::metrics::{MetricsSnapshot, TickStats};
use scan_common::state::DriverState;
use scan_common::time::{TickPeriod, Timestamp};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Why [`ScanDriver::supervise`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT or SIGTERM was received.
    Interrupted(Interrupt),
    /// The run limit elapsed.
    TimeLimit,
    /// The driver was not running when supervision began.
    NotRunning,
}

/// Resources that only exist while the driver is running.
struct Armed {
    timer: TimerDriver,
    worker: TickWorker,
}

/// Periodic scan driver for one engine.
pub struct ScanDriver<E: ScanEngine> {
    engine: Arc<E>,
    config: DriverConfig,
    clock: Arc<dyn Clock>,
    ctx: Arc<TickContext>,
    state: DriverState,
    armed: Option<Armed>,
    interrupts: Option<InterruptGuard>,
}

impl<E: ScanEngine> ScanDriver<E> {
    /// Create a stopped driver using the system clock.
    pub fn new(engine: E, config: DriverConfig) -> Self {
        Self::with_clock(engine, config, Arc::new(SystemClock))
    }

    /// Create a stopped driver sampling `clock` on every tick.
    pub fn with_clock(engine: E, config: DriverConfig, clock: Arc<dyn Clock>) -> Self {
        let ctx = Arc::new(TickContext::new(config.tick_period(), &config.metrics));
        Self {
            engine: Arc::new(engine),
            config,
            clock,
            ctx,
            state: DriverState::Stopped,
            armed: None,
            interrupts: None,
        }
    }

    /// Initialize the engine and arm the timer.
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidStateTransition`] if already running
    /// - [`ScanError::Realtime`] if fail-fast real-time setup is refused
    /// - [`ScanError::TimerCreate`] if the timer or tick worker cannot be created
    /// - [`ScanError::EngineInit`] if the engine rejects `args`; no tick fires
    pub fn start(&mut self, args: &[String]) -> ScanResult<()> {
        if !self.state.can_transition_to(DriverState::Running) {
            return Err(ScanError::InvalidStateTransition {
                from: self.state.to_string(),
                to: DriverState::Running.to_string(),
            });
        }

        let period = self.ctx.period();
        let first = self.config.effective_first_fire_offset();
        info!(
            %period,
            first_fire_us = first.as_micros(),
            policy = %self.config.overrun_policy,
            "Starting scan driver"
        );

        realtime::lock_memory_if_requested(&self.config.realtime)?;

        let cycle = TickCallback::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.ctx),
            Arc::clone(&self.clock),
        )
        .into_cycle_fn();
        let worker = TickWorker::spawn(
            self.config.overrun_policy,
            self.config.queue_depth,
            cycle,
            self.ctx.counters(),
            &self.config.realtime,
        )?;
        let dispatcher = worker.dispatcher();
        let timer = TimerDriver::create("scan-timer", move |firing| dispatcher.dispatch(firing))?;

        if let Err(e) = self.engine.init(args) {
            timer.destroy();
            if let Err(fault) = worker.shutdown() {
                warn!(error = %fault, "Tick worker fault while abandoning start");
            }
            error!(error = %e, "Engine init failed, timer never armed");
            return Err(match e {
                ScanError::EngineInit { .. } => e,
                other => ScanError::EngineInit {
                    code: other.status_code(),
                    reason: other.to_string(),
                },
            });
        }

        timer.arm(first, period.as_duration());

        if self.config.install_interrupt_handler && self.interrupts.is_none() {
            match interrupt::install() {
                Ok(guard) => self.interrupts = Some(guard),
                Err(e) => warn!(error = %e, "Interrupt handler not installed"),
            }
        }

        self.armed = Some(Armed { timer, worker });
        self.state.transition_to(DriverState::Running)?;
        info!("Scan driver running");
        Ok(())
    }

    /// Disarm the timer, clean up the engine, and release debugger threads.
    ///
    /// Stopping a stopped driver only aborts the debug bridge.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Fault`] if a cycle panicked. The driver is
    /// stopped regardless.
    pub fn stop(&mut self) -> ScanResult<()> {
        let Some(Armed { timer, worker }) = self.armed.take() else {
            debug!("Stop on a stopped driver");
            self.ctx.debug().abort();
            return Ok(());
        };

        info!("Stopping scan driver");
        timer.disarm();
        timer.destroy();
        let halted = worker.shutdown();

        self.engine.cleanup();
        self.ctx.debug().abort();
        if let Some(guard) = self.interrupts.take() {
            guard.restore();
        }
        self.state.transition_to(DriverState::Stopped)?;

        let stats = self.ctx.stats();
        info!(
            fired = stats.fired,
            executed = stats.executed,
            dropped = stats.dropped(),
            timer_overruns = stats.timer_overruns,
            "Scan driver stopped"
        );
        halted
    }

    /// Run the control loop until an interrupt arrives or `limit` elapses,
    /// then stop the driver.
    ///
    /// On an interrupt, `Got Signal <n>` is printed to stdout before stopping.
    /// Interrupts are only observed when this driver installed the handler.
    ///
    /// # Errors
    ///
    /// Propagates the error of the final [`ScanDriver::stop`].
    pub fn supervise(&mut self, limit: Option<Duration>) -> ScanResult<StopReason> {
        if !self.state.is_running() {
            return Ok(StopReason::NotRunning);
        }

        let started = Instant::now();
        let poll = self.config.supervisor_poll.max(Duration::from_millis(1));
        debug!(poll_ms = poll.as_millis(), ?limit, "Supervising scan driver");

        loop {
            if self.interrupts.is_some() {
                if let Some(signal) = interrupt::take_pending() {
                    println!("Got Signal {}", signal.number());
                    info!(%signal, "Interrupt received");
                    self.stop()?;
                    return Ok(StopReason::Interrupted(signal));
                }
            }

            let mut nap = poll;
            if let Some(limit) = limit {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    info!(elapsed_ms = elapsed.as_millis(), "Run limit reached");
                    self.stop()?;
                    return Ok(StopReason::TimeLimit);
                }
                nap = nap.min(limit - elapsed);
            }
            thread::sleep(nap);
        }
    }

    /// Re-arm the running timer with a nanosecond offset and period.
    ///
    /// `(0, 0)` disarms. Ignored while stopped.
    pub fn set_timer(&self, first_ns: i64, period_ns: i64) {
        match &self.armed {
            Some(armed) => armed.timer.set_timer(first_ns, period_ns),
            None => warn!("set_timer on a stopped driver ignored"),
        }
    }

    /// Time sampled at the most recent tick.
    #[must_use]
    pub fn current_time(&self) -> Timestamp {
        self.ctx.current_time()
    }

    /// Debug bridge shared with the engine.
    #[must_use]
    pub fn debug_bridge(&self) -> &DebugBridge {
        self.ctx.debug()
    }

    /// Shared tick context, for threads that outlive a borrow of the driver.
    #[must_use]
    pub fn context(&self) -> Arc<TickContext> {
        Arc::clone(&self.ctx)
    }

    /// Dispatcher counters.
    #[must_use]
    pub fn stats(&self) -> TickStats {
        self.ctx.stats()
    }

    /// Cycle execution-time metrics, if enabled.
    #[must_use]
    pub fn cycle_metrics(&self) -> Option<MetricsSnapshot> {
        self.ctx.cycle_metrics()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Tick period.
    #[must_use]
    pub fn period(&self) -> TickPeriod {
        self.ctx.period()
    }

    /// The driven engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Driver configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl<E: ScanEngine> Drop for ScanDriver<E> {
    fn drop(&mut self) {
        if self.state.is_running() {
            if let Err(e) = self.stop() {
                error!(error = %e, "Scan driver stop failed during drop");
            }
        }
    }
}

/// Builder for a [`ScanDriver`].
pub struct ScanDriverBuilder<E: ScanEngine> {
    engine: E,
    config: DriverConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl<E: ScanEngine> ScanDriverBuilder<E> {
    /// Start from the default configuration.
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            config: DriverConfig::default(),
            clock: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Base period in milliseconds, clamped to at least 1 ms.
    #[must_use]
    pub fn base_period_ms(mut self, millis: i64) -> Self {
        self.config.base_period_ms = millis;
        self
    }

    /// Delay before the first firing.
    #[must_use]
    pub fn first_fire_offset(mut self, offset: Duration) -> Self {
        self.config.first_fire_offset = Some(offset);
        self
    }

    /// What to do with firings that arrive during a running cycle.
    #[must_use]
    pub fn overrun_policy(mut self, policy: OverrunPolicy) -> Self {
        self.config.overrun_policy = policy;
        self
    }

    /// Whether `start` installs the SIGINT/SIGTERM handler.
    #[must_use]
    pub fn interrupt_handler(mut self, install: bool) -> Self {
        self.config.install_interrupt_handler = install;
        self
    }

    /// Clock sampled on every tick.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build a stopped driver.
    pub fn build(self) -> ScanDriver<E> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        ScanDriver::with_clock(self.engine, self.config, clock)
    }
}
