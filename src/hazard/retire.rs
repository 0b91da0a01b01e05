//! Thread-local retire lists.

use super::registry::is_hazard;
use std::cell::RefCell;

/// Reclaimer invoked once a retired pointer is provably unprotected.
pub type ReclaimFn = unsafe fn(*mut ());

/// Retire-list length that triggers a reclamation scan.
pub const RETIRE_SCAN_THRESHOLD: usize = 64;

struct Retired {
    ptr: *mut (),
    reclaim: ReclaimFn,
}

thread_local! {
    static RETIRED: RefCell<Vec<Retired>> = const { RefCell::new(Vec::new()) };
}

/// Park a logically deleted pointer for later reclamation.
///
/// Once the list reaches [`RETIRE_SCAN_THRESHOLD`] entries a scan runs and
/// reclaims everything no longer protected by any thread.
///
/// # Safety
/// `ptr` must be logically unreachable (no new protections can be created
/// for it), must not be retired twice, and `reclaim` must be safe to call
/// on it exactly once.
pub unsafe fn retire(ptr: *mut (), reclaim: ReclaimFn) {
    let len = RETIRED.with(|list| {
        let mut list = list.borrow_mut();
        list.push(Retired { ptr, reclaim });
        list.len()
    });
    if len >= RETIRE_SCAN_THRESHOLD {
        scan();
    }
}

/// Reclaim every retired pointer that no thread currently protects.
///
/// Returns the number of pointers reclaimed. Entries that are still
/// protected stay parked for a later scan.
pub fn scan() -> usize {
    // Take the list out before running reclaimers so a reclaimer that
    // allocates (and re-enters the arena machinery) never observes a held
    // borrow.
    let entries = RETIRED.with(|list| std::mem::take(&mut *list.borrow_mut()));
    if entries.is_empty() {
        return 0;
    }

    let mut survivors = Vec::new();
    let mut reclaimed = 0;
    for entry in entries {
        if is_hazard(entry.ptr) {
            survivors.push(entry);
        } else {
            unsafe { (entry.reclaim)(entry.ptr) };
            reclaimed += 1;
        }
    }
    RETIRED.with(|list| {
        let mut list = list.borrow_mut();
        // retire() may have run inside a reclaimer; keep anything it added.
        survivors.append(&mut list);
        *list = survivors;
    });
    reclaimed
}

/// Number of pointers currently parked on this thread's retire list.
pub fn pending() -> usize {
    RETIRED.with(|list| list.borrow().len())
}

/// Scan until no further progress is possible.
///
/// Called by workers on the way out; returns the number of entries still
/// blocked by other threads' protections. Whatever remains is dropped with
/// the thread and its slots are recovered when the owning arena is dropped.
pub fn flush() -> usize {
    while pending() > 0 {
        if scan() == 0 {
            break;
        }
    }
    pending()
}
