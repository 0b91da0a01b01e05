//! Engine configuration.

use super::error::OrderBookError;

/// Default number of matching worker threads.
pub const DEFAULT_NUM_WORKERS: usize = 4;

/// Default maximum number of registered symbols.
pub const DEFAULT_MAX_SYMBOLS: usize = 256;

/// Default per-arena order capacity.
pub const DEFAULT_MAX_ORDERS: usize = 1 << 16;

/// Default publish-ring capacity (must be a power of two).
pub const DEFAULT_RING_SIZE: usize = 1 << 20;

/// Default price-table bucket count per side (must be a power of two).
pub const DEFAULT_NUM_BUCKETS: usize = 16_384;

/// How many ticks inward a stale best-of-book is searched before it is
/// declared empty. Finite so a crossing stays O(1) amortized; if the true
/// best lies further inward, the next insert at it repairs the cell.
pub const BACKTRACK_TICKS: u64 = 25;

/// Capacities and sizing for an [`super::OrderBook`].
///
/// The defaults match the constants above; a config is validated once at
/// construction and never changes afterwards. Small configs are the norm in
/// tests — the engine does not care, only the power-of-two constraints
/// matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookConfig {
    /// Matching worker threads spawned by `start`.
    pub num_workers: usize,
    /// Upper bound on registered symbols; ids are 16-bit.
    pub max_symbols: usize,
    /// Capacity of the shared order arena and of each worker's node arena.
    pub max_orders: usize,
    /// Publish-ring capacity, a power of two.
    pub ring_size: usize,
    /// Price-table buckets per side per symbol, a power of two.
    pub num_buckets: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        BookConfig {
            num_workers: DEFAULT_NUM_WORKERS,
            max_symbols: DEFAULT_MAX_SYMBOLS,
            max_orders: DEFAULT_MAX_ORDERS,
            ring_size: DEFAULT_RING_SIZE,
            num_buckets: DEFAULT_NUM_BUCKETS,
        }
    }
}

impl BookConfig {
    /// A compact configuration for tests and simulations.
    pub fn small() -> Self {
        BookConfig {
            num_workers: 2,
            max_symbols: 16,
            max_orders: 4096,
            ring_size: 1 << 12,
            num_buckets: 1 << 10,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), OrderBookError> {
        let fail = |reason: &str| {
            Err(OrderBookError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.num_workers == 0 {
            return fail("num_workers must be at least 1");
        }
        if self.max_symbols == 0 || self.max_symbols > usize::from(u16::MAX) + 1 {
            return fail("max_symbols must fit the 16-bit symbol id space");
        }
        if self.max_orders == 0 {
            return fail("max_orders must be at least 1");
        }
        if self.ring_size == 0 || !self.ring_size.is_power_of_two() {
            return fail("ring_size must be a non-zero power of two");
        }
        if self.num_buckets == 0 || !self.num_buckets.is_power_of_two() {
            return fail("num_buckets must be a non-zero power of two");
        }
        Ok(())
    }
}
