//! Lock-free LIFO free list over arena slot indices.

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Sentinel index meaning "end of list".
const NIL: u32 = u32::MAX;

/// A LIFO stack of free slot indices.
///
/// The head packs `(generation, top index)` into a single `AtomicU64`; the
/// generation is bumped on every successful push or pop, which defeats the
/// classic ABA interleaving where a slot is popped, recycled and pushed
/// again between a competitor's read and its CAS. Next-links live in a side
/// table rather than overlaid on slot memory, so the list never reads bytes
/// that an allocation may concurrently be writing.
///
/// LIFO order is deliberate: the most recently returned slot is the one most
/// likely to still be cache-resident.
pub(crate) struct FreeList {
    head: CachePadded<AtomicU64>,
    links: Box<[AtomicU32]>,
}

impl FreeList {
    /// Create a list covering `capacity` slots, all initially free.
    ///
    /// Slots are seeded in reverse so the first pops come out in index
    /// order, which keeps a freshly created arena walking its slab
    /// sequentially.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "free list capacity must be non-zero");
        assert!(
            capacity < NIL as usize,
            "free list capacity must fit in a u32 index space"
        );

        let links: Box<[AtomicU32]> = (0..capacity).map(|_| AtomicU32::new(NIL)).collect();
        let list = FreeList {
            head: CachePadded::new(AtomicU64::new(pack(0, NIL))),
            links,
        };
        for idx in (0..capacity as u32).rev() {
            list.push(idx);
        }
        list
    }

    /// Push a slot index onto the stack.
    pub(crate) fn push(&self, idx: u32) {
        debug_assert!((idx as usize) < self.links.len());
        loop {
            let current = self.head.load(Ordering::Acquire);
            let (generation, top) = unpack(current);
            self.links[idx as usize].store(top, Ordering::Relaxed);
            // Release publishes the link store above to whoever pops `idx`.
            if self
                .head
                .compare_exchange_weak(
                    current,
                    pack(generation.wrapping_add(1), idx),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    /// Pop the most recently pushed slot index, if any.
    pub(crate) fn pop(&self) -> Option<u32> {
        loop {
            let current = self.head.load(Ordering::Acquire);
            let (generation, top) = unpack(current);
            if top == NIL {
                return None;
            }
            // This load may observe a stale link if another thread wins the
            // race; the generation bump makes the CAS below fail in that
            // case, so the stale value is never installed.
            let next = self.links[top as usize].load(Ordering::Relaxed);
            if self
                .head
                .compare_exchange_weak(
                    current,
                    pack(generation.wrapping_add(1), next),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return Some(top);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        let (_, top) = unpack(self.head.load(Ordering::Acquire));
        top == NIL
    }
}

#[inline]
fn pack(generation: u32, idx: u32) -> u64 {
    (u64::from(generation) << 32) | u64::from(idx)
}

#[inline]
fn unpack(bits: u64) -> (u32, u32) {
    ((bits >> 32) as u32, bits as u32)
}
