//! Symbol records: two price ladders plus the top-of-book cells.

use super::order::Side;
use super::table::PriceTable;
use crate::arena::PoolHandle;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel for "no resting bid".
pub const NO_BID_TICKS: u64 = 0;

/// Sentinel for "no resting ask".
pub const NO_ASK_TICKS: u64 = u64::MAX;

/// One tradable instrument.
///
/// The best-bid/best-ask cells are maintained by the workers with monotone
/// CAS loops on insert and bounded backtracking when the top level drains;
/// readers get a value that was recently a valid top-of-book but may lag
/// the true best by up to the backtrack window during turbulence.
pub struct Symbol {
    id: u16,
    name: String,
    buy_levels: PriceTable,
    sell_levels: PriceTable,
    best_bid_ticks: AtomicU64,
    best_ask_ticks: AtomicU64,
    owner: PoolHandle,
}

impl Symbol {
    pub(crate) fn new(id: u16, name: String, num_buckets: usize, owner: PoolHandle) -> Symbol {
        Symbol {
            id,
            name,
            buy_levels: PriceTable::new(num_buckets),
            sell_levels: PriceTable::new(num_buckets),
            best_bid_ticks: AtomicU64::new(NO_BID_TICKS),
            best_ask_ticks: AtomicU64::new(NO_ASK_TICKS),
            owner,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ladder for one side.
    pub fn table(&self, side: Side) -> &PriceTable {
        match side {
            Side::Buy => &self.buy_levels,
            Side::Sell => &self.sell_levels,
        }
    }

    /// The top-of-book cell for one side.
    pub(crate) fn best_cell(&self, side: Side) -> &AtomicU64 {
        match side {
            Side::Buy => &self.best_bid_ticks,
            Side::Sell => &self.best_ask_ticks,
        }
    }

    /// The "no liquidity" sentinel for one side.
    pub(crate) fn empty_sentinel(side: Side) -> u64 {
        match side {
            Side::Buy => NO_BID_TICKS,
            Side::Sell => NO_ASK_TICKS,
        }
    }

    /// Raw best bid in ticks; [`NO_BID_TICKS`] when the side is empty.
    pub fn best_bid_ticks(&self) -> u64 {
        self.best_bid_ticks.load(Ordering::Acquire)
    }

    /// Raw best ask in ticks; [`NO_ASK_TICKS`] when the side is empty.
    pub fn best_ask_ticks(&self) -> u64 {
        self.best_ask_ticks.load(Ordering::Acquire)
    }

    pub(crate) fn owner(&self) -> PoolHandle {
        self.owner
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Symbol")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("best_bid_ticks", &self.best_bid_ticks())
            .field("best_ask_ticks", &self.best_ask_ticks())
            .finish()
    }
}
