//! Price levels: one FIFO queue of resting orders per tick.

use super::order::Order;
use crate::arena::PoolHandle;
use crate::deque::Deque;
use std::sync::atomic::{AtomicU32, Ordering};

/// All resting orders at a single tick on one side of a symbol.
///
/// The queue holds raw order pointers in arrival order; `num_orders` counts
/// the live (unmarked) entries and is what `is_active` checks. Levels are
/// created on demand by the first worker that needs the tick, installed
/// into the price table exactly once, and stay there until shutdown — a
/// level with `num_orders == 0` is merely dormant, not reclaimed.
pub struct PriceLevel {
    price_ticks: u64,
    queue: Deque<*mut Order>,
    num_orders: AtomicU32,
    owner: PoolHandle,
}

impl PriceLevel {
    pub(crate) fn new(price_ticks: u64, owner: PoolHandle) -> PriceLevel {
        PriceLevel {
            price_ticks,
            queue: Deque::new(),
            num_orders: AtomicU32::new(0),
            owner,
        }
    }

    /// The tick this level represents.
    pub fn price_ticks(&self) -> u64 {
        self.price_ticks
    }

    /// Number of resting orders.
    pub fn order_count(&self) -> u32 {
        self.num_orders.load(Ordering::Acquire)
    }

    /// Whether any order rests here.
    pub fn is_active(&self) -> bool {
        self.order_count() > 0
    }

    pub(crate) fn queue(&self) -> &Deque<*mut Order> {
        &self.queue
    }

    pub(crate) fn increment_orders(&self) {
        self.num_orders.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decrement_orders(&self) {
        self.num_orders.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn owner(&self) -> PoolHandle {
        self.owner
    }
}

impl std::fmt::Debug for PriceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceLevel")
            .field("price_ticks", &self.price_ticks)
            .field("num_orders", &self.order_count())
            .finish()
    }
}
