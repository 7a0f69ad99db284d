//! Debugger thread that follows published ticks.

use scan_runtime::debug_bridge::DEBUG_ABORTED;
use scan_runtime::tick::TickContext;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace};

/// Handle to a running debug watcher.
pub struct DebugWatcher {
    handle: JoinHandle<u64>,
}

/// Spawn a thread that waits on the debug bridge until it is aborted.
pub fn spawn(ctx: Arc<TickContext>) -> std::io::Result<DebugWatcher> {
    let handle = thread::Builder::new()
        .name("scan-debug-watch".into())
        .spawn(move || follow(&ctx))?;
    info!("Debug watcher attached");
    Ok(DebugWatcher { handle })
}

impl DebugWatcher {
    /// Wait for the watcher to see the abort and return the ticks it observed.
    pub fn join(self) -> anyhow::Result<u64> {
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("debug watcher panicked"))
    }
}

fn follow(ctx: &TickContext) -> u64 {
    let mut observed = 0u64;
    let mut last = 0i64;
    loop {
        let tick = ctx.debug().wait();
        if tick == DEBUG_ABORTED {
            break;
        }
        observed += 1;
        if tick > last + 1 {
            trace!(tick, missed = tick - last - 1, "Debug watcher fell behind");
        }
        debug!(tick, time = %ctx.current_time(), "Debug tick");
        last = tick;
    }
    info!(observed, last_tick = last, "Debug watcher detached");
    observed
}
