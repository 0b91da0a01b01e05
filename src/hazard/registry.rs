//! The global hazard-pointer table.

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering, fence};
use tracing::error;

/// Maximum number of threads that can hold hazard pointers at once.
pub const MAX_HAZARD_THREADS: usize = 64;

/// Hazard cells per thread row. The deque algorithms hold a handful of
/// protections at a time, plus a few more per level of helper recursion;
/// sixteen covers the deepest chains seen in the soak tests.
pub const HAZARDS_PER_THREAD: usize = 16;

struct Row {
    cells: [AtomicPtr<()>; HAZARDS_PER_THREAD],
}

impl Row {
    const fn new() -> Self {
        Row {
            cells: [const { AtomicPtr::new(std::ptr::null_mut()) }; HAZARDS_PER_THREAD],
        }
    }
}

static ROWS: [Row; MAX_HAZARD_THREADS] = [const { Row::new() }; MAX_HAZARD_THREADS];
static ROW_CLAIMED: [AtomicBool; MAX_HAZARD_THREADS] =
    [const { AtomicBool::new(false) }; MAX_HAZARD_THREADS];

fn claim_row() -> usize {
    for idx in 0..MAX_HAZARD_THREADS {
        if ROW_CLAIMED[idx]
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return idx;
        }
    }
    // Misconfiguration, not a runtime condition: more live threads than the
    // table admits. Unwinding through lock-free code is not an option.
    error!(max = MAX_HAZARD_THREADS, "hazard-pointer table exhausted");
    std::process::abort();
}

fn release_row(idx: usize) {
    for cell in &ROWS[idx].cells {
        cell.store(std::ptr::null_mut(), Ordering::Relaxed);
    }
    ROW_CLAIMED[idx].store(false, Ordering::Release);
}

struct RowGuard {
    idx: usize,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        release_row(self.idx);
    }
}

thread_local! {
    // Claimed on first use, returned to the table when the thread exits.
    static ROW_GUARD: RowGuard = RowGuard { idx: claim_row() };
}

fn my_row() -> &'static Row {
    &ROWS[ROW_GUARD.with(|guard| guard.idx)]
}

/// Publish `ptr` as in-use by the calling thread.
///
/// The store is followed by a sequentially consistent fence: a reclaimer
/// whose [`is_hazard`] scan misses this cell is guaranteed to have
/// unlinked the node *before* the caller re-validates its source pointer,
/// so one of the two sides always notices the other.
pub fn protect(ptr: *mut ()) {
    if ptr.is_null() {
        return;
    }
    let row = my_row();
    for cell in &row.cells {
        if cell.load(Ordering::Relaxed).is_null() {
            cell.store(ptr, Ordering::Release);
            fence(Ordering::SeqCst);
            return;
        }
    }
    error!(per_thread = HAZARDS_PER_THREAD, "hazard cells exhausted on this thread");
    std::process::abort();
}

/// Withdraw a protection previously published with [`protect`].
///
/// A no-op if the pointer is not in the calling thread's row.
pub fn unprotect(ptr: *mut ()) {
    if ptr.is_null() {
        return;
    }
    let row = my_row();
    for cell in &row.cells {
        if cell.load(Ordering::Relaxed) == ptr {
            cell.store(std::ptr::null_mut(), Ordering::Release);
            return;
        }
    }
}

/// True if any thread currently protects `ptr`.
pub fn is_hazard(ptr: *mut ()) -> bool {
    fence(Ordering::SeqCst);
    for row in &ROWS {
        for cell in &row.cells {
            if cell.load(Ordering::Acquire) == ptr {
                return true;
            }
        }
    }
    false
}
