//! Small shared utilities: tick conversion, thread tokens and idle waiting.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of ticks per unit of price. One tick is one cent.
pub const TICK_PRECISION: u64 = 100;

/// Convert a floating-point price to integer ticks.
///
/// Prices are carried as integer ticks everywhere inside the engine; floats
/// only appear at the submission boundary. The caller is expected to have
/// validated that `price` is finite and positive.
#[inline]
pub fn price_to_ticks(price: f64) -> u64 {
    (price * TICK_PRECISION as f64).round() as u64
}

/// Convert integer ticks back to a floating-point price.
#[inline]
pub fn ticks_to_price(ticks: u64) -> f64 {
    ticks as f64 / TICK_PRECISION as f64
}

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// Stable numeric identity for the calling thread.
///
/// Tokens start at 1 so that 0 can be used as "no owner" in atomic cells.
/// Used by [`crate::arena::Arena`] to route deallocations between the local
/// free list and the remote-free channel.
pub fn thread_token() -> u64 {
    THREAD_TOKEN.with(|cell| {
        let mut token = cell.get();
        if token == 0 {
            token = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
            cell.set(token);
        }
        token
    })
}

/// Spin-yield until `cond` returns true or `timeout` elapses.
///
/// Returns true if the condition was observed before the deadline. This is
/// the loop every harness ends up writing around `is_idle`; it makes no
/// stronger guarantee than the condition it polls.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::yield_now();
    }
}
