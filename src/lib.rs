//! # Multi-Symbol Lock-Free Limit Order Book Engine
//!
//! A multi-threaded continuous-matching limit order book with price-time
//! priority. Client threads submit ADD and CANCEL orders; a pool of worker
//! threads executes match-then-rest semantics against per-symbol bid/ask
//! ladders. Every structure on the order path is lock-free: the only
//! blocking primitive in the crate is `thread::join` at shutdown.
//!
//! ## Architecture
//!
//! The engine is built leaves-first from a small set of concurrent
//! primitives:
//!
//! - **[`arena`]** — fixed-capacity object pools with LIFO free lists. One
//!   arena is homed on one thread; other threads return slots through a
//!   bounded MPSC remote-free ring, eliminating allocator contention on the
//!   hot path.
//! - **[`hazard`]** — a process-global hazard-pointer table plus
//!   thread-local retire lists. This is the entire memory-reclamation
//!   story: no reference counts, no epochs, no locks.
//! - **[`deque`]** — a lock-free doubly linked FIFO deque (Sundell–Tsigas)
//!   with two sentinels and mark-bit deletion. One deque per price level
//!   keeps resting orders in strict arrival order and supports middle
//!   removal for cancels.
//! - **[`orderbook`]** — the engine itself: an open-addressed price table
//!   per side per symbol, best-bid/best-ask cells maintained by monotone
//!   CAS with bounded backtracking, a bounded MPMC publish ring connecting
//!   clients to workers, and the [`OrderBook`] façade.
//!
//! ## Design points
//!
//! - **Integer ticks.** Prices live as `round(price × 100)` ticks
//!   everywhere past the submission boundary; floats never enter the
//!   matching path.
//! - **Maker-price execution.** A crossing order trades at the resting
//!   level's price, never its own.
//! - **FIFO at a level.** Orders at one tick are consumed in link order; a
//!   partially filled maker is re-inserted at the head of its level and
//!   keeps its time priority.
//! - **Bounded staleness.** Top-of-book cells may lag the true best by at
//!   most the backtrack window ([`BACKTRACK_TICKS`]) during turbulence and
//!   converge under quiescence.
//! - **Per-worker memory.** Workers own their node and level arenas;
//!   freeing an order allocated by a client thread routes the slot home
//!   through the remote-free channel instead of contending on a shared
//!   allocator.
//!
//! ## Usage
//!
//! ```no_run
//! use matchbook_core::{BookConfig, OrderBook, Side};
//!
//! let mut book = OrderBook::with_config(BookConfig::small()).unwrap();
//! let symbol = book.register_symbol("AAPL").unwrap();
//! book.start().unwrap();
//!
//! let (order_id, handle) = book
//!     .submit_order(42, symbol, Side::Buy, 100, 150.00)
//!     .unwrap();
//! assert_eq!(order_id >> 48, u64::from(symbol));
//!
//! // Orders are matched asynchronously; wait for quiescence before
//! // inspecting the book.
//! book.wait_idle(std::time::Duration::from_secs(1));
//! if handle.has_rested() {
//!     book.cancel_order(handle);
//! }
//! book.shutdown();
//! ```
//!
//! ## Scope
//!
//! Orders are implicitly good-till-cancelled. There is no persistence, no
//! order modification (cancel and re-add instead), no self-match
//! prevention and no market-data fan-out; the book reports its state
//! through read-only queries on the façade.

pub mod arena;
pub mod deque;
pub mod hazard;
pub mod orderbook;
pub mod prelude;
mod utils;

pub use orderbook::{
    BACKTRACK_TICKS, BookConfig, DEFAULT_MAX_ORDERS, DEFAULT_MAX_SYMBOLS, DEFAULT_NUM_BUCKETS,
    DEFAULT_NUM_WORKERS, DEFAULT_RING_SIZE, NO_ASK_TICKS, NO_BID_TICKS, OrderBook, OrderBookError,
    OrderHandle, OrderState, Side, make_order_id, symbol_id_of,
};
pub use utils::{TICK_PRECISION, price_to_ticks, thread_token, ticks_to_price, wait_until};
