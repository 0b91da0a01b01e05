//! The order book engine: symbols, price ladders, publish ring, matching
//! workers and the public façade.

mod book;
mod config;
mod error;
mod level;
mod order;
mod ring;
mod symbol;
mod table;
#[cfg(test)]
mod tests;
mod worker;

pub use book::OrderBook;
pub use config::{
    BACKTRACK_TICKS, BookConfig, DEFAULT_MAX_ORDERS, DEFAULT_MAX_SYMBOLS, DEFAULT_NUM_BUCKETS,
    DEFAULT_NUM_WORKERS, DEFAULT_RING_SIZE,
};
pub use error::OrderBookError;
pub use level::PriceLevel;
pub use order::{Order, OrderHandle, OrderState, Side, make_order_id, symbol_id_of};
pub use ring::PublishRing;
pub use symbol::{NO_ASK_TICKS, NO_BID_TICKS, Symbol};
pub use table::PriceTable;
