//! Prelude module that re-exports the commonly used types.
//!
//! Instead of importing each type individually, you can use:
//!
//! ```rust
//! use matchbook_core::prelude::*;
//! ```

// The façade and its surface.
pub use crate::orderbook::{BookConfig, OrderBook, OrderBookError, OrderHandle, OrderState, Side};

// Engine constants.
pub use crate::orderbook::{
    BACKTRACK_TICKS, DEFAULT_MAX_ORDERS, DEFAULT_MAX_SYMBOLS, DEFAULT_NUM_BUCKETS,
    DEFAULT_NUM_WORKERS, DEFAULT_RING_SIZE, NO_ASK_TICKS, NO_BID_TICKS,
};

// Order-id helpers and tick conversion.
pub use crate::orderbook::{make_order_id, symbol_id_of};
pub use crate::utils::{TICK_PRECISION, price_to_ticks, ticks_to_price};

// Lower layers, for embedders building their own structures on top.
pub use crate::arena::{Arena, ArenaExhausted, PoolHandle, RemoteFreeRing};
pub use crate::deque::Deque;
