//! Bounded ring carrying slot returns from non-owner threads.

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Sentinel meaning "slot empty".
const NIL: u32 = u32::MAX;

/// Multi-producer ring of arena slot indices.
///
/// Producers are the threads returning slots to an arena they do not own;
/// the consumer is whichever thread runs the arena's
/// [`drain_remote_free`](crate::arena::Arena::drain_remote_free). A producer
/// claims a position with `fetch_add` and then CASes the slot from empty to
/// its index; a non-empty slot means the ring is momentarily full and the
/// push reports failure so the caller can yield and retry.
///
/// The consumer side claims `tail` by CAS rather than a plain store, so a
/// drain executed off the owner thread cannot double-pop. In steady state
/// there is still exactly one draining thread.
pub struct RemoteFreeRing {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    slots: Box<[AtomicU32]>,
    mask: u64,
}

impl RemoteFreeRing {
    /// Create a ring able to hold at least `min_capacity` entries.
    ///
    /// The actual capacity is the next power of two, which keeps index
    /// wrapping a single mask. Sized to the arena capacity the ring can
    /// never be full for long: at most `capacity` slots exist to return.
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(1).next_power_of_two();
        assert!(capacity < NIL as usize, "remote-free ring too large");
        RemoteFreeRing {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            slots: (0..capacity).map(|_| AtomicU32::new(NIL)).collect(),
            mask: capacity as u64 - 1,
        }
    }

    /// Number of entries the ring can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Attempt to enqueue a slot index. Returns false if the claimed
    /// position was still occupied (ring full); the caller should yield and
    /// try again.
    pub fn push(&self, idx: u32) -> bool {
        debug_assert_ne!(idx, NIL);
        let pos = self.head.fetch_add(1, Ordering::AcqRel);
        let slot = &self.slots[(pos & self.mask) as usize];
        // Release pairs with the consumer's acquire load so the slot's
        // contents are fully visible when taken.
        slot.compare_exchange(NIL, idx, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    /// Dequeue the oldest pending return, if any.
    pub fn pop(&self) -> Option<u32> {
        loop {
            let pos = self.tail.load(Ordering::Acquire);
            let slot = &self.slots[(pos & self.mask) as usize];
            if slot.load(Ordering::Acquire) == NIL {
                return None;
            }
            if self
                .tail
                .compare_exchange(pos, pos + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let taken = slot.swap(NIL, Ordering::AcqRel);
                debug_assert_ne!(taken, NIL);
                return Some(taken);
            }
        }
    }

    /// True when no returns are pending at the current tail.
    pub fn is_empty(&self) -> bool {
        let pos = self.tail.load(Ordering::Acquire);
        self.slots[(pos & self.mask) as usize].load(Ordering::Acquire) == NIL
    }
}
