//! The publish ring: clients in, workers out.

use super::order::Order;
use crossbeam::utils::{Backoff, CachePadded};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// Bounded MPMC ring of order pointers.
///
/// Producers (client threads) claim a sequence with `fetch_add` and then
/// CAS their pointer into the claimed slot; claiming the sequence *first*
/// is what keeps two producers off the same slot. Workers claim the
/// consume side with a CAS on `work_seq` and may briefly spin for a
/// producer that claimed its slot but has not stored into it yet.
///
/// `pending` counts published-but-not-fully-processed orders and backs
/// [`PublishRing::is_idle`]; a worker decrements it only after the order's
/// insert or cancel has completely finished, not at pull time.
pub struct PublishRing {
    publish_seq: CachePadded<AtomicU64>,
    work_seq: CachePadded<AtomicU64>,
    pending: CachePadded<AtomicU64>,
    slots: Box<[AtomicPtr<Order>]>,
    mask: u64,
}

impl PublishRing {
    /// Create a ring with `capacity` slots (a power of two).
    pub fn new(capacity: usize) -> PublishRing {
        assert!(
            capacity.is_power_of_two(),
            "publish ring capacity must be a power of two"
        );
        PublishRing {
            publish_seq: CachePadded::new(AtomicU64::new(0)),
            work_seq: CachePadded::new(AtomicU64::new(0)),
            pending: CachePadded::new(AtomicU64::new(0)),
            slots: (0..capacity)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
            mask: capacity as u64 - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Publish an order pointer, yielding while the ring is full.
    ///
    /// Backpressure is not an error: the wait is bounded by worker
    /// throughput. The slot store uses release ordering so the order's
    /// fields are visible to the worker that acquires the pointer.
    pub fn publish(&self, order: NonNull<Order>) {
        // Counted before the sequence claim so is_idle can never observe
        // a claimed-but-uncounted order.
        self.pending.fetch_add(1, Ordering::AcqRel);
        let seq = self.publish_seq.fetch_add(1, Ordering::AcqRel);

        while seq >= self.work_seq.load(Ordering::Acquire) + self.slots.len() as u64 {
            std::thread::yield_now();
        }

        let slot = &self.slots[(seq & self.mask) as usize];
        let backoff = Backoff::new();
        // The slot may still hold the pointer from the previous lap until
        // its consumer clears it.
        while slot
            .compare_exchange_weak(
                std::ptr::null_mut(),
                order.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_err()
        {
            backoff.spin();
        }
    }

    /// Pull the next order, if any. Safe for any number of workers.
    pub fn pull(&self) -> Option<NonNull<Order>> {
        let seq = self.work_seq.load(Ordering::Acquire);
        if seq >= self.publish_seq.load(Ordering::Acquire) {
            return None;
        }
        if self
            .work_seq
            .compare_exchange(seq, seq + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another worker claimed this sequence; the caller just retries.
            return None;
        }

        let slot = &self.slots[(seq & self.mask) as usize];
        let backoff = Backoff::new();
        loop {
            // The producer that claimed this sequence may still be writing.
            let order = slot.swap(std::ptr::null_mut(), Ordering::AcqRel);
            if let Some(order) = NonNull::new(order) {
                return Some(order);
            }
            backoff.spin();
        }
    }

    /// Signal that a pulled order has been completely processed.
    pub fn order_processed(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Published-but-unprocessed order count.
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// True when every published order has been fully processed.
    ///
    /// Meaningful as a quiescence barrier only after producers have
    /// stopped; a worker may have pulled an order it has not finished yet,
    /// so this is not a linearization point.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}
