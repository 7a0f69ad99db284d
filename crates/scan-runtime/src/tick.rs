//! Tick context, tick callback, and dispatch of timer firings.
//!
//! Firings arrive on the timer thread and are forwarded to a single tick
//! worker over a bounded channel, so the rest of the driver never deals
//! with an open-ended number of callback contexts. What happens to a firing
//! that arrives while a cycle is still running is decided by the
//! [`OverrunPolicy`]:
//!
//! - `Skip`: a busy flag, taken with [`compare_and_swap`], admits one cycle
//!   at a time; late firings are dropped and counted.
//! - `Queue`: firings wait in the worker's channel (up to `queue_depth`)
//!   and run back to back.
//! - `Overlap`: a late firing runs right away on an extra thread, alongside
//!   the cycle in progress. This reproduces the unguarded behavior of a
//!   plain `SIGEV_THREAD` timer and exists for engines that rely on it.
//!   Each extra thread applies the same real-time settings as the worker
//!   before running its cycle.

use crate::atomic::compare_and_swap;
use crate::clock::{Clock, CurrentTime};
use crate::debug_bridge::DebugBridge;
use crate::engine::ScanEngine;
use crate::realtime;
use crate::timer::Firing;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use crossbeam_utils::CachePadded;
use scan_common::config::{MetricsConfig, OverrunPolicy, RealtimeConfig};
use scan_common::error::{ScanError, ScanResult};
use scan_common::metrics::{CycleMetrics, MetricsSnapshot, TickStats};
use scan_common::time::{TickPeriod, Timestamp};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

const IDLE: i64 = 0;
const BUSY: i64 = 1;

/// One cycle of work, type-erased so the dispatcher is engine-agnostic.
pub type CycleFn = Arc<dyn Fn() + Send + Sync>;

/// Dispatcher counters, one cache line each.
#[derive(Debug, Default)]
pub struct TickCounters {
    fired: CachePadded<AtomicU64>,
    executed: CachePadded<AtomicU64>,
    skipped: CachePadded<AtomicU64>,
    queue_overflows: CachePadded<AtomicU64>,
    overlapped: CachePadded<AtomicU64>,
    timer_overruns: CachePadded<AtomicU64>,
}

impl TickCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> TickStats {
        TickStats {
            fired: self.fired.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            overlapped: self.overlapped.load(Ordering::Relaxed),
            timer_overruns: self.timer_overruns.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the driver, the tick context, and the engine.
#[derive(Debug)]
pub struct TickContext {
    current_time: CurrentTime,
    debug: DebugBridge,
    period: TickPeriod,
    metrics: Option<Mutex<CycleMetrics>>,
    counters: Arc<TickCounters>,
}

impl TickContext {
    /// Create a context for ticks of `period`.
    #[must_use]
    pub fn new(period: TickPeriod, metrics: &MetricsConfig) -> Self {
        Self {
            current_time: CurrentTime::new(),
            debug: DebugBridge::new(),
            period,
            metrics: metrics
                .enabled
                .then(|| Mutex::new(CycleMetrics::new(metrics.histogram_size, period.as_duration()))),
            counters: Arc::new(TickCounters::default()),
        }
    }

    /// Time sampled at the start of the most recent tick.
    #[must_use]
    pub fn current_time(&self) -> Timestamp {
        self.current_time.get()
    }

    /// Debug handoff to attached debugger threads.
    #[must_use]
    pub fn debug(&self) -> &DebugBridge {
        &self.debug
    }

    /// Tick period the timer is armed with.
    #[must_use]
    pub fn period(&self) -> TickPeriod {
        self.period
    }

    /// Dispatcher counters.
    #[must_use]
    pub fn stats(&self) -> TickStats {
        self.counters.snapshot()
    }

    /// Cycle execution-time metrics, if enabled.
    #[must_use]
    pub fn cycle_metrics(&self) -> Option<MetricsSnapshot> {
        self.metrics.as_ref().map(|m| {
            m.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot()
        })
    }

    pub(crate) fn counters(&self) -> Arc<TickCounters> {
        Arc::clone(&self.counters)
    }

    fn finish_cycle(&self, elapsed: Duration) {
        TickCounters::bump(&self.counters.executed, 1);
        if let Some(metrics) = &self.metrics {
            metrics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(elapsed);
        }
    }
}

/// What runs on every dispatched firing: sample the clock, run one cycle.
pub struct TickCallback<E: ScanEngine> {
    engine: Arc<E>,
    ctx: Arc<TickContext>,
    clock: Arc<dyn Clock>,
}

impl<E: ScanEngine> TickCallback<E> {
    /// Bind an engine, its context, and a clock.
    pub fn new(engine: Arc<E>, ctx: Arc<TickContext>, clock: Arc<dyn Clock>) -> Self {
        Self { engine, ctx, clock }
    }

    /// Run one tick on the calling thread.
    ///
    /// Engine panics are not caught here.
    pub fn fire(&self) {
        let now = self.ctx.current_time.sample(self.clock.as_ref());
        let started = Instant::now();
        self.engine.run_cycle(&self.ctx);
        let elapsed = started.elapsed();
        self.ctx.finish_cycle(elapsed);
        trace!(%now, elapsed_us = elapsed.as_micros(), "Cycle complete");
    }

    /// Erase the engine type.
    pub fn into_cycle_fn(self) -> CycleFn {
        Arc::new(move || self.fire())
    }
}

/// Applies the overrun policy to firings coming from the timer thread.
pub struct TickDispatcher {
    policy: OverrunPolicy,
    busy: CachePadded<AtomicI64>,
    halted: AtomicBool,
    work: Sender<Firing>,
    cycle: CycleFn,
    counters: Arc<TickCounters>,
    realtime: RealtimeConfig,
    overlap_threads: Mutex<Vec<JoinHandle<()>>>,
    overlap_panics: AtomicUsize,
}

impl TickDispatcher {
    /// Hand one firing to the tick worker. Called on the timer thread.
    pub fn dispatch(&self, firing: Firing) {
        if self.halted.load(Ordering::Acquire) {
            return;
        }
        TickCounters::bump(&self.counters.fired, 1);
        if firing.missed > 0 {
            TickCounters::bump(&self.counters.timer_overruns, firing.missed);
        }

        match self.policy {
            OverrunPolicy::Queue => self.enqueue(firing),
            OverrunPolicy::Skip | OverrunPolicy::Overlap => {
                if compare_and_swap(&self.busy, IDLE, BUSY) == IDLE {
                    self.enqueue(firing);
                } else if self.policy == OverrunPolicy::Skip {
                    TickCounters::bump(&self.counters.skipped, 1);
                    trace!(seq = firing.seq, "Cycle still running, firing skipped");
                } else {
                    self.spawn_overlapping(firing);
                }
            }
        }
    }

    fn enqueue(&self, firing: Firing) {
        match self.work.try_send(firing) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if self.policy == OverrunPolicy::Queue {
                    TickCounters::bump(&self.counters.queue_overflows, 1);
                } else {
                    compare_and_swap(&self.busy, BUSY, IDLE);
                    TickCounters::bump(&self.counters.skipped, 1);
                }
                warn!(seq = firing.seq, policy = %self.policy, "Tick worker backlog full, firing dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(seq = firing.seq, "Tick worker gone, firing dropped");
            }
        }
    }

    fn spawn_overlapping(&self, firing: Firing) {
        let cycle = Arc::clone(&self.cycle);
        let mut threads = self
            .overlap_threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.reap_finished(&mut threads);

        let rt_config = self.realtime.clone();
        match thread::Builder::new()
            .name("scan-tick-overlap".into())
            .spawn(move || {
                if let Err(e) = realtime::configure_current_thread(&rt_config) {
                    warn!(error = %e, "Real-time setup refused for overlapping cycle");
                }
                cycle();
            })
        {
            Ok(handle) => {
                threads.push(handle);
                TickCounters::bump(&self.counters.overlapped, 1);
                warn!(seq = firing.seq, in_flight = threads.len() + 1, "Cycle overlaps a running cycle");
            }
            Err(e) => {
                TickCounters::bump(&self.counters.skipped, 1);
                warn!(seq = firing.seq, error = %e, "Could not spawn overlapping cycle, firing skipped");
            }
        }
    }

    /// Join overlap threads that already exited, remembering panics.
    fn reap_finished(&self, threads: &mut Vec<JoinHandle<()>>) {
        let (finished, running): (Vec<_>, Vec<_>) =
            threads.drain(..).partition(JoinHandle::is_finished);
        *threads = running;
        for handle in finished {
            if handle.join().is_err() {
                self.overlap_panics.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn run_worker(&self, work: &Receiver<Firing>, stop: &Receiver<()>) {
        debug!(policy = %self.policy, "Tick worker started");
        loop {
            crossbeam_channel::select! {
                recv(work) -> firing => {
                    let Ok(firing) = firing else { break };
                    if self.halted.load(Ordering::Acquire) {
                        break;
                    }
                    trace!(seq = firing.seq, "Running tick");
                    (self.cycle)();
                    compare_and_swap(&self.busy, BUSY, IDLE);
                }
                recv(stop) -> _ => break,
            }
        }
        debug!("Tick worker stopped");
    }
}

/// Owner of the tick worker thread.
pub struct TickWorker {
    dispatcher: Arc<TickDispatcher>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TickWorker {
    /// Spawn the worker and apply the real-time settings to it.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::TimerCreate`] if the thread cannot be spawned, or
    /// the real-time error when `fail_fast` setup is refused.
    pub fn spawn(
        policy: OverrunPolicy,
        queue_depth: usize,
        cycle: CycleFn,
        counters: Arc<TickCounters>,
        realtime: &RealtimeConfig,
    ) -> ScanResult<Self> {
        let capacity = match policy {
            OverrunPolicy::Queue => queue_depth.max(1),
            OverrunPolicy::Skip | OverrunPolicy::Overlap => 1,
        };
        let (work_tx, work_rx) = crossbeam_channel::bounded(capacity);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let dispatcher = Arc::new(TickDispatcher {
            policy,
            busy: CachePadded::new(AtomicI64::new(IDLE)),
            halted: AtomicBool::new(false),
            work: work_tx,
            cycle,
            counters,
            realtime: realtime.clone(),
            overlap_threads: Mutex::new(Vec::new()),
            overlap_panics: AtomicUsize::new(0),
        });

        let worker = Arc::clone(&dispatcher);
        let rt_config = realtime.clone();
        let thread = thread::Builder::new()
            .name("scan-tick".into())
            .spawn(move || {
                let setup = realtime::configure_current_thread(&rt_config);
                let proceed = setup.is_ok();
                let _ = ready_tx.send(setup);
                if proceed {
                    worker.run_worker(&work_rx, &stop_rx);
                }
            })
            .map_err(|e| ScanError::TimerCreate(format!("failed to spawn tick worker: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(status)) => debug!(?status, "Tick worker ready"),
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(ScanError::TimerCreate(
                    "tick worker exited during setup".into(),
                ));
            }
        }

        Ok(Self {
            dispatcher,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Dispatcher to hand to the timer.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<TickDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Discard pending firings and wait for cycles in flight to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Fault`] if a cycle panicked on the worker or an
    /// overlapping thread.
    pub fn shutdown(mut self) -> ScanResult<()> {
        self.halt()
    }

    fn halt(&mut self) -> ScanResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.dispatcher.halted.store(true, Ordering::Release);
        drop(self.stop.take());

        let mut panicked = usize::from(thread.join().is_err())
            + self.dispatcher.overlap_panics.swap(0, Ordering::Relaxed);
        let overlapping: Vec<_> = self
            .dispatcher
            .overlap_threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in overlapping {
            panicked += usize::from(handle.join().is_err());
        }

        if panicked > 0 {
            error!(panicked, "Tick cycle panicked");
            return Err(ScanError::Fault(format!(
                "{panicked} tick thread(s) panicked"
            )));
        }
        Ok(())
    }
}

impl Drop for TickWorker {
    fn drop(&mut self) {
        let _ = self.halt();
    }
}

static_assertions::assert_impl_all!(TickContext: Send, Sync);
static_assertions::assert_impl_all!(TickDispatcher: Send, Sync);
