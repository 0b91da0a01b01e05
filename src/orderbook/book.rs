//! The book façade: symbol registry, submission, worker lifecycle.

use super::config::BookConfig;
use super::error::OrderBookError;
use super::order::{Order, OrderHandle, Side, make_order_id};
use super::ring::PublishRing;
use super::symbol::{NO_ASK_TICKS, NO_BID_TICKS, Symbol};
use super::worker::Worker;
use crate::arena::Arena;
use crate::hazard;
use crate::utils::{price_to_ticks, ticks_to_price, wait_until};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace, warn};

thread_local! {
    // Per-thread order sequence; combined with the symbol id in the high
    // bits this makes ids unique per submitting thread.
    static LOCAL_SEQ: Cell<u64> = const { Cell::new(0) };
}

/// Shared-map value pointing at an arena-resident symbol.
#[derive(Clone, Copy)]
struct SymbolRef(NonNull<Symbol>);

unsafe impl Send for SymbolRef {}
unsafe impl Sync for SymbolRef {}

/// The multi-symbol matching engine.
///
/// Client threads submit ADD and CANCEL orders through the publish ring; a
/// pool of matching workers executes match-then-rest semantics against
/// per-symbol bid/ask ladders. Registration and submission are safe from
/// any thread; `start` must be called before submissions are expected to
/// make progress (orders submitted earlier simply queue in the ring).
///
/// ```no_run
/// use matchbook_core::{BookConfig, OrderBook, Side};
///
/// let mut book = OrderBook::with_config(BookConfig::small()).unwrap();
/// let aapl = book.register_symbol("AAPL").unwrap();
/// book.start().unwrap();
///
/// book.submit_order(1, aapl, Side::Buy, 100, 150.00);
/// book.submit_order(2, aapl, Side::Sell, 100, 150.00);
/// while !book.is_idle() {
///     std::thread::yield_now();
/// }
/// assert_eq!(book.best_bid_ticks(aapl), None);
/// book.shutdown();
/// ```
pub struct OrderBook {
    config: BookConfig,
    name_to_id: DashMap<String, u16>,
    symbols: DashMap<u16, SymbolRef>,
    // Wider than the id so exhausting the id space cannot wrap it.
    next_symbol_id: AtomicU32,
    ring: Arc<PublishRing>,
    // Arc-backed so the pool handles captured by in-flight orders and
    // symbols stay valid even if the book value itself is moved.
    orders: Arc<Arena<Order>>,
    symbol_arena: Arc<Arena<Symbol>>,
    running: Arc<AtomicBool>,
    workers: Vec<Arc<Worker>>,
    handles: Vec<JoinHandle<()>>,
}

impl OrderBook {
    /// A book with the default configuration.
    pub fn new() -> OrderBook {
        // The default configuration always validates.
        OrderBook::with_config(BookConfig::default()).unwrap_or_else(|_| unreachable!())
    }

    /// A book with an explicit configuration.
    pub fn with_config(config: BookConfig) -> Result<OrderBook, OrderBookError> {
        config.validate()?;
        Ok(OrderBook {
            name_to_id: DashMap::new(),
            symbols: DashMap::new(),
            next_symbol_id: AtomicU32::new(0),
            ring: Arc::new(PublishRing::new(config.ring_size)),
            orders: Arc::new(Arena::new(config.max_orders)),
            symbol_arena: Arc::new(Arena::new(config.max_symbols)),
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            handles: Vec::new(),
            config,
        })
    }

    /// The configuration this book was built with.
    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    /// Register a symbol, or return the existing id for a known name.
    ///
    /// # Errors
    /// [`OrderBookError::MaxSymbolsExceeded`] once the configured capacity
    /// is reached.
    pub fn register_symbol(&self, name: &str) -> Result<u16, OrderBookError> {
        if let Some(existing) = self.name_to_id.get(name) {
            return Ok(*existing.value());
        }
        match self.name_to_id.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let claimed = self.next_symbol_id.fetch_update(
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    |current| ((current as usize) < self.config.max_symbols).then_some(current + 1),
                );
                let Ok(id) = claimed.map(|current| current as u16) else {
                    return Err(OrderBookError::MaxSymbolsExceeded {
                        max: self.config.max_symbols,
                    });
                };
                let slot = self.symbol_arena.allocate()?;
                unsafe {
                    slot.as_ptr().write(Symbol::new(
                        id,
                        name.to_string(),
                        self.config.num_buckets,
                        self.symbol_arena.handle(),
                    ));
                }
                self.symbols.insert(id, SymbolRef(slot));
                entry.insert(id);
                debug!(symbol = name, id, "symbol registered");
                Ok(id)
            }
        }
    }

    /// Spawn the matching workers.
    ///
    /// Idempotent; calling it on a started book does nothing.
    pub fn start(&mut self) -> Result<(), OrderBookError> {
        if !self.handles.is_empty() {
            return Ok(());
        }
        self.running.store(true, Ordering::Release);
        for worker_id in 0..self.config.num_workers {
            let worker = Arc::new(Worker::new(
                worker_id as u16,
                &self.config,
                Arc::clone(&self.running),
            ));
            let ring = Arc::clone(&self.ring);
            let runner = Arc::clone(&worker);
            let handle = std::thread::Builder::new()
                .name(format!("matchbook-worker-{worker_id}"))
                .spawn(move || runner.run(&ring))?;
            self.workers.push(worker);
            self.handles.push(handle);
        }
        debug!(workers = self.config.num_workers, "order book started");
        Ok(())
    }

    /// Submit an order. Returns `None` on validation failure or resource
    /// exhaustion; see [`OrderBook::try_submit_order`] for the reasons.
    pub fn submit_order(
        &self,
        user_id: u32,
        symbol_id: u16,
        side: Side,
        quantity: u32,
        price: f64,
    ) -> Option<(u64, OrderHandle)> {
        self.try_submit_order(user_id, symbol_id, side, quantity, price)
            .ok()
    }

    /// Submit an order, reporting why it was rejected.
    ///
    /// The order id is returned immediately; matching happens
    /// asynchronously on a worker. The handle stays valid until the order
    /// fully matches or a cancel for it is processed.
    ///
    /// # Errors
    /// [`OrderBookError::InvalidQuantity`], [`OrderBookError::InvalidPrice`],
    /// [`OrderBookError::UnknownSymbol`] on validation failure;
    /// [`OrderBookError::ArenaExhausted`] when the order arena is full.
    pub fn try_submit_order(
        &self,
        user_id: u32,
        symbol_id: u16,
        side: Side,
        quantity: u32,
        price: f64,
    ) -> Result<(u64, OrderHandle), OrderBookError> {
        if quantity == 0 {
            trace!(user_id, symbol_id, "rejecting zero quantity");
            return Err(OrderBookError::InvalidQuantity { quantity });
        }
        if !price.is_finite() || price <= 0.0 {
            trace!(user_id, symbol_id, price, "rejecting non-positive price");
            return Err(OrderBookError::InvalidPrice { price });
        }
        let symbol = self
            .symbols
            .get(&symbol_id)
            .map(|entry| entry.value().0)
            .ok_or(OrderBookError::UnknownSymbol { symbol_id })?;

        let price_ticks = price_to_ticks(price);
        let sequence = LOCAL_SEQ.with(|cell| {
            let sequence = cell.get();
            cell.set(sequence + 1);
            sequence
        });
        let order_id = make_order_id(symbol_id, sequence);

        let slot = self.orders.allocate()?;
        unsafe {
            slot.as_ptr().write(Order::new(
                order_id,
                user_id,
                side,
                quantity,
                price_ticks,
                symbol_id,
                symbol.as_ptr(),
                self.orders.handle(),
            ));
        }

        let handle = OrderHandle::new(slot, order_id, price_ticks, side);
        self.ring.publish(slot);
        trace!(order_id, user_id, symbol_id, %side, quantity, price, "order submitted");
        Ok((order_id, handle))
    }

    /// Cancel a resting order. Returns true iff the cancel was accepted:
    /// the order had rested and no other cancel was in flight.
    pub fn cancel_order(&self, handle: OrderHandle) -> bool {
        self.try_cancel_order(handle).is_ok()
    }

    /// Cancel a resting order, reporting why it was rejected.
    ///
    /// # Errors
    /// [`OrderBookError::NotCancellable`] if the order never rested, was
    /// already fully matched, is momentarily claimed by a matcher, or a
    /// cancel for it is already in flight.
    pub fn try_cancel_order(&self, handle: OrderHandle) -> Result<(), OrderBookError> {
        let order = unsafe { handle.order_ptr().as_ref() };
        if order.id() != handle.order_id() {
            // The slot has been recycled for a newer order.
            return Err(OrderBookError::NotCancellable);
        }
        if !order.request_cancel() {
            return Err(OrderBookError::NotCancellable);
        }
        // The cancel message is a second reference to the slot.
        order.acquire_ref();
        self.ring.publish(handle.order_ptr());
        trace!(order_id = handle.order_id(), "cancel submitted");
        Ok(())
    }

    /// True when every published order has been fully processed.
    ///
    /// Use only as a quiescence barrier after producers have stopped; the
    /// pull-to-process window makes this unsuitable as a linearization
    /// point.
    pub fn is_idle(&self) -> bool {
        self.ring.is_idle()
    }

    /// Spin-yield until [`OrderBook::is_idle`], bounded by `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        wait_until(timeout, || self.is_idle())
    }

    /// Published-but-unprocessed order count.
    pub fn pending_orders(&self) -> u64 {
        self.ring.pending()
    }

    /// The id a name was registered under.
    pub fn symbol_id(&self, name: &str) -> Option<u16> {
        self.name_to_id.get(name).map(|entry| *entry.value())
    }

    /// The name behind a symbol id.
    pub fn symbol_name(&self, symbol_id: u16) -> Option<String> {
        self.symbol(symbol_id)
            .map(|symbol| unsafe { symbol.as_ref() }.name().to_string())
    }

    /// Number of registered symbols.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Best bid in ticks, `None` when the bid side is empty (or the symbol
    /// unknown).
    pub fn best_bid_ticks(&self, symbol_id: u16) -> Option<u64> {
        let symbol = self.symbol(symbol_id)?;
        let ticks = unsafe { symbol.as_ref() }.best_bid_ticks();
        (ticks != NO_BID_TICKS).then_some(ticks)
    }

    /// Best ask in ticks, `None` when the ask side is empty (or the symbol
    /// unknown).
    pub fn best_ask_ticks(&self, symbol_id: u16) -> Option<u64> {
        let symbol = self.symbol(symbol_id)?;
        let ticks = unsafe { symbol.as_ref() }.best_ask_ticks();
        (ticks != NO_ASK_TICKS).then_some(ticks)
    }

    /// Best bid as a float price.
    pub fn best_bid(&self, symbol_id: u16) -> Option<f64> {
        self.best_bid_ticks(symbol_id).map(ticks_to_price)
    }

    /// Best ask as a float price.
    pub fn best_ask(&self, symbol_id: u16) -> Option<f64> {
        self.best_ask_ticks(symbol_id).map(ticks_to_price)
    }

    /// Resting order count at a tick; 0 for unknown symbols or ticks whose
    /// level was never installed.
    pub fn level_order_count(&self, symbol_id: u16, side: Side, price_ticks: u64) -> u32 {
        self.symbol(symbol_id)
            .and_then(|symbol| unsafe { symbol.as_ref() }.table(side).lookup(price_ticks))
            .map(|level| unsafe { level.as_ref() }.order_count())
            .unwrap_or(0)
    }

    /// Whether a tick has at least one resting order.
    pub fn level_is_active(&self, symbol_id: u16, side: Side, price_ticks: u64) -> bool {
        self.symbol(symbol_id)
            .is_some_and(|symbol| unsafe { symbol.as_ref() }.table(side).is_active(price_ticks))
    }

    /// Stop the workers and tear the book down.
    ///
    /// Drops the running flag, joins every worker (each finishes its
    /// current order first), releases undelivered ring entries, and frees
    /// all resting orders, nodes, levels and symbols back to their arenas.
    /// Idempotent; also invoked by `Drop`.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("matching worker panicked before shutdown");
            }
        }
        self.teardown();
        self.workers.clear();
    }

    fn symbol(&self, symbol_id: u16) -> Option<NonNull<Symbol>> {
        self.symbols.get(&symbol_id).map(|entry| entry.value().0)
    }

    /// Free everything the book still owns. Runs strictly after the
    /// workers have been joined and before their arenas are dropped.
    fn teardown(&mut self) {
        let mut undelivered = 0usize;
        while let Some(order) = self.ring.pull() {
            self.ring.order_processed();
            unsafe { Order::release_ref(order.as_ptr()) };
            undelivered += 1;
        }

        let ids: Vec<u16> = self.symbols.iter().map(|entry| *entry.key()).collect();
        let mut resting = 0usize;
        for id in ids {
            if let Some((_, symbol)) = self.symbols.remove(&id) {
                resting += unsafe { self.teardown_symbol(symbol.0) };
            }
        }
        self.name_to_id.clear();

        // Nodes freed above went through this thread's retire list; the
        // workers are gone, so nothing can still protect them.
        hazard::flush();
        self.orders.drain_remote_free();

        if undelivered > 0 || resting > 0 {
            debug!(undelivered, resting, "book teardown released orders");
        }
    }

    unsafe fn teardown_symbol(&self, symbol_ptr: NonNull<Symbol>) -> usize {
        let mut resting = 0usize;
        unsafe {
            let symbol = symbol_ptr.as_ref();
            for side in [Side::Buy, Side::Sell] {
                for level_ptr in symbol.table(side).installed() {
                    let level = level_ptr.as_ref();
                    while let Some(order_ptr) = level.queue().pop_left() {
                        Order::release_ref(order_ptr);
                        resting += 1;
                    }
                    let owner = level.owner();
                    std::ptr::drop_in_place(level_ptr.as_ptr());
                    owner.release(level_ptr.as_ptr() as *mut u8);
                }
            }
            let owner = symbol.owner();
            std::ptr::drop_in_place(symbol_ptr.as_ptr());
            owner.release(symbol_ptr.as_ptr() as *mut u8);
        }
        resting
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OrderBook {
    fn drop(&mut self) {
        self.shutdown();
    }
}
