//! Hazard-pointer reclamation.
//!
//! A process-global table publishes, per thread, the raw pointers that
//! thread is currently dereferencing. Logically deleted deque nodes are
//! parked on a thread-local retire list and only handed back to their arena
//! once a full scan of the table proves no thread still protects them.
//!
//! This is the whole reclamation story for the lock-free structures in this
//! crate: no reference counts, no epochs. The discipline callers follow is
//! always the same — publish the pointer, re-validate the source cell, and
//! only then dereference.

mod registry;
mod retire;

pub use registry::{
    HAZARDS_PER_THREAD, MAX_HAZARD_THREADS, is_hazard, protect, unprotect,
};
pub use retire::{RETIRE_SCAN_THRESHOLD, ReclaimFn, flush, pending, retire, scan};
