//! Lock-free compare-and-swap on a machine word.
//!
//! Safe to call from any context, including the timer thread and signal
//! handlers: it compiles down to a single `cmpxchg`.

use std::sync::atomic::{AtomicI64, Ordering};

/// Atomically replace `cell` with `new` if it currently holds `expected`.
///
/// Always returns the value observed before the (possible) write, so the
/// swap happened iff the return value equals `expected`.
#[inline]
pub fn compare_and_swap(cell: &AtomicI64, expected: i64, new: i64) -> i64 {
    match cell.compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire) {
        Ok(previous) | Err(previous) => previous,
    }
}
