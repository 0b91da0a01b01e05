//! Open-addressed price table.

use super::level::PriceLevel;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Flat hash table from tick price to price level, linear probing.
///
/// The bucket count is a power of two so the hash is a mask. Buckets are
/// installed with a single CAS by the first worker needing a tick and are
/// never vacated while the book is running; under steady flow tick reuse is
/// high and the probe length stays short. Cleanup happens once, at
/// shutdown.
pub struct PriceTable {
    buckets: Box<[AtomicPtr<PriceLevel>]>,
    mask: usize,
}

impl PriceTable {
    pub(crate) fn new(num_buckets: usize) -> PriceTable {
        assert!(
            num_buckets.is_power_of_two(),
            "price table bucket count must be a power of two"
        );
        PriceTable {
            buckets: (0..num_buckets)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
            mask: num_buckets - 1,
        }
    }

    #[inline]
    fn hash(&self, price_ticks: u64) -> usize {
        price_ticks as usize & self.mask
    }

    /// Number of buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Find the level for a tick.
    ///
    /// Probes linearly from the hash slot; the first empty bucket ends the
    /// probe, since installs never leave gaps.
    pub fn lookup(&self, price_ticks: u64) -> Option<NonNull<PriceLevel>> {
        let mut index = self.hash(price_ticks);
        for _ in 0..self.buckets.len() {
            let level = self.buckets[index].load(Ordering::Acquire);
            match NonNull::new(level) {
                None => return None,
                Some(found) => {
                    if unsafe { found.as_ref() }.price_ticks() == price_ticks {
                        return Some(found);
                    }
                }
            }
            index = (index + 1) & self.mask;
        }
        None
    }

    /// Install a freshly created level.
    ///
    /// Returns true if this call installed it; false if another worker beat
    /// us to the tick (the caller must discard its level and use the
    /// winner's) or the table is full.
    pub(crate) fn install(&self, level: NonNull<PriceLevel>) -> bool {
        let price_ticks = unsafe { level.as_ref() }.price_ticks();
        let mut index = self.hash(price_ticks);
        for _ in 0..self.buckets.len() {
            if self.buckets[index]
                .compare_exchange(
                    std::ptr::null_mut(),
                    level.as_ptr(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
            // Occupied: if it is our tick, somebody else installed first.
            let current = self.buckets[index].load(Ordering::Acquire);
            if let Some(existing) = NonNull::new(current) {
                if unsafe { existing.as_ref() }.price_ticks() == price_ticks {
                    return false;
                }
            }
            index = (index + 1) & self.mask;
        }
        false
    }

    /// Whether the tick has a level with at least one resting order.
    pub fn is_active(&self, price_ticks: u64) -> bool {
        self.lookup(price_ticks)
            .is_some_and(|level| unsafe { level.as_ref() }.is_active())
    }

    /// Every installed level, for shutdown teardown.
    pub(crate) fn installed(&self) -> impl Iterator<Item = NonNull<PriceLevel>> + '_ {
        self.buckets
            .iter()
            .filter_map(|bucket| NonNull::new(bucket.load(Ordering::Acquire)))
    }
}
