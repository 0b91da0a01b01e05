//! Matching workers: pull, match, rest, cancel.

use super::config::{BACKTRACK_TICKS, BookConfig};
use super::level::PriceLevel;
use super::order::{Order, OrderNode, Side};
use super::ring::PublishRing;
use super::symbol::Symbol;
use crate::arena::Arena;
use crate::hazard;
use crossbeam::utils::Backoff;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, trace, warn};

/// One matching thread's state: its identity, the shared running flag, and
/// the arenas it owns for deque nodes and price levels.
///
/// Workers never allocate orders — those come from the book's shared arena
/// and are returned to it through its remote-free channel when a worker
/// frees one.
pub(crate) struct Worker {
    id: u16,
    running: Arc<AtomicBool>,
    nodes: Arena<OrderNode>,
    levels: Arena<PriceLevel>,
}

// The arenas hold raw-pointer payloads (nodes carry `*mut Order`), which
// blocks the auto traits; the engine's ownership protocol is what actually
// keeps cross-thread access sound.
unsafe impl Send for Worker {}
unsafe impl Sync for Worker {}

impl Worker {
    pub(crate) fn new(id: u16, config: &BookConfig, running: Arc<AtomicBool>) -> Worker {
        Worker {
            id,
            running,
            nodes: Arena::new(config.max_orders),
            levels: Arena::new(config.num_buckets),
        }
    }

    /// The pull loop. Runs until the book's running flag drops; the current
    /// order is always finished before exiting.
    pub(crate) fn run(&self, ring: &PublishRing) {
        // The arenas were constructed on the spawning thread; adopt them so
        // this thread's frees take the local path.
        self.nodes.bind_home();
        self.levels.bind_home();
        debug!(worker = self.id, "matching worker started");

        let backoff = Backoff::new();
        while self.running.load(Ordering::Acquire) {
            match ring.pull() {
                Some(order) => {
                    self.process(order.as_ptr());
                    ring.order_processed();
                    backoff.reset();
                }
                None => backoff.snooze(),
            }
        }

        let blocked = hazard::flush();
        if blocked > 0 {
            debug!(
                worker = self.id,
                blocked, "retire entries still protected at worker exit"
            );
        }
        debug!(worker = self.id, "matching worker stopped");
    }

    /// Dispatch on the order's lifecycle state (the publish path only ever
    /// carries `Pending` adds and `CancelRequested` cancels).
    fn process(&self, order_ptr: *mut Order) {
        let order = unsafe { &*order_ptr };
        match order.state() {
            super::order::OrderState::Pending => self.insert_order(order_ptr),
            super::order::OrderState::CancelRequested => self.cancel_order(order_ptr),
            state => {
                error!(?state, order_id = order.id(), "order published in impossible state");
                unsafe { Order::release_ref(order_ptr) };
            }
        }
    }

    /// ADD path: match first, rest the remainder.
    fn insert_order(&self, order_ptr: *mut Order) {
        let order = unsafe { &*order_ptr };
        let symbol = unsafe { &*order.symbol() };

        self.match_order(order, symbol);

        if order.remaining_quantity() == 0 {
            trace!(order_id = order.id(), "order fully matched on entry");
            unsafe { Order::release_ref(order_ptr) };
            return;
        }

        let Some(level_ptr) = self.get_or_create_level(symbol, order.price_ticks(), order.side())
        else {
            warn!(
                order_id = order.id(),
                price_ticks = order.price_ticks(),
                "no price level available; dropping remainder"
            );
            unsafe { Order::release_ref(order_ptr) };
            return;
        };
        let level = unsafe { level_ptr.as_ref() };

        // Count first: a maker popped between link and count would drive
        // num_orders below zero otherwise. A count of one with a briefly
        // empty queue is benign (the pop loop just comes up empty).
        level.increment_orders();
        match level.queue().push_right(order_ptr, &self.nodes) {
            Some(node) => {
                order.set_node(node.as_ptr());
                // From here on the client may cancel.
                order.finish_rest();
                self.update_best_price(symbol, order.price_ticks(), order.side());
            }
            None => {
                level.decrement_orders();
                warn!(
                    worker = self.id,
                    order_id = order.id(),
                    "node arena exhausted; dropping remainder"
                );
                unsafe { Order::release_ref(order_ptr) };
            }
        }
    }

    /// CANCEL path: unlink the resting node (unless a matcher got there
    /// first) and drop the cancel message's reference.
    fn cancel_order(&self, order_ptr: *mut Order) {
        let order = unsafe { &*order_ptr };
        let symbol = unsafe { &*order.symbol() };
        let table = symbol.table(order.side());

        match table.lookup(order.price_ticks()) {
            None => {
                // A resting order always has an installed level; this is
                // invariant breakage, not a runtime condition.
                error!(
                    order_id = order.id(),
                    price_ticks = order.price_ticks(),
                    "cancel for a price level that was never installed"
                );
            }
            Some(level_ptr) => {
                let level = unsafe { level_ptr.as_ref() };
                loop {
                    let node = order.node();
                    if node.is_null() {
                        // A matcher consumed the node and published that
                        // fact; nothing left to unlink.
                        break;
                    }
                    // Hazard-validate through order.node: the matcher
                    // clears that cell before retiring the node, so a
                    // successful re-read pins the node.
                    hazard::protect(node as *mut ());
                    if order.node() != node {
                        hazard::unprotect(node as *mut ());
                        continue;
                    }
                    let removed = unsafe { level.queue().remove_node(node) };
                    hazard::unprotect(node as *mut ());
                    if removed.is_some() {
                        // We unlinked it, so the queue reference is ours
                        // to drop as well.
                        level.decrement_orders();
                        unsafe { Order::release_ref(order_ptr) };
                    }
                    break;
                }
            }
        }

        trace!(order_id = order.id(), "cancel processed");
        unsafe { Order::release_ref(order_ptr) };
    }

    /// The match loop: while the order crosses the opposing top-of-book,
    /// consume makers at the best level, backtracking whenever the level
    /// drains.
    fn match_order(&self, order: &Order, symbol: &Symbol) {
        let opposite = order.side().opposite();
        let opposite_table = symbol.table(opposite);

        while self.running.load(Ordering::Acquire) && order.remaining_quantity() > 0 {
            let best = symbol.best_cell(opposite).load(Ordering::Acquire);
            if !can_cross(best, order) {
                return;
            }
            let Some(level_ptr) = opposite_table.lookup(best) else {
                self.backtrack_top(symbol, opposite);
                continue;
            };
            if !opposite_table.is_active(best) {
                self.backtrack_top(symbol, opposite);
                continue;
            }

            self.match_at_level(order, unsafe { level_ptr.as_ref() });

            if !opposite_table.is_active(best) {
                self.backtrack_top(symbol, opposite);
            }
        }
    }

    /// Consume makers FIFO at one level. Trades execute at the maker's
    /// resting price implicitly: quantity moves, the level is the price.
    fn match_at_level(&self, order: &Order, level: &PriceLevel) {
        while order.remaining_quantity() > 0 && level.order_count() > 0 {
            let Some((maker_ptr, node)) = level.queue().pop_left_entry() else {
                break;
            };
            let maker = unsafe { &*maker_ptr };

            // Claim the maker. A failed CAS means either a cancel is in
            // flight, or the linking worker is still between the push and
            // its `Resting` stamp — that window is a few instructions, so
            // wait it out rather than misreading a fresh order as
            // cancelled.
            let claimed = loop {
                if maker.begin_match() {
                    break true;
                }
                match maker.state() {
                    super::order::OrderState::CancelRequested => break false,
                    _ => std::thread::yield_now(),
                }
            };
            if !claimed {
                // The pending cancel message owns the free; we unlinked
                // the node. Publish the consumed node before retiring it
                // so the cancel path cannot touch a recycled slot.
                maker.clear_node();
                unsafe { level.queue().retire_entry(node) };
                level.decrement_orders();
                unsafe { Order::release_ref(maker_ptr) };
                continue;
            }

            let maker_quantity = maker.remaining_quantity();
            let taker_quantity = order.remaining_quantity();

            if taker_quantity >= maker_quantity {
                // Maker fully consumed.
                order.fill(maker_quantity);
                maker.clear_node();
                unsafe { level.queue().retire_entry(node) };
                level.decrement_orders();
                trace!(
                    maker_id = maker.id(),
                    taker_id = order.id(),
                    quantity = maker_quantity,
                    price_ticks = level.price_ticks(),
                    "maker filled"
                );
                unsafe { Order::release_ref(maker_ptr) };
            } else {
                // Taker fully consumed; the maker's remainder goes back to
                // the head of the level so it keeps its time priority.
                maker.fill(taker_quantity);
                order.zero_quantity();
                unsafe { level.queue().retire_entry(node) };
                match level.queue().push_left(maker_ptr, &self.nodes) {
                    Some(new_node) => {
                        maker.set_node(new_node.as_ptr());
                        maker.finish_rest();
                    }
                    None => {
                        warn!(
                            worker = self.id,
                            maker_id = maker.id(),
                            "node arena exhausted re-inserting partial fill; dropping remainder"
                        );
                        maker.clear_node();
                        level.decrement_orders();
                        unsafe { Order::release_ref(maker_ptr) };
                    }
                }
                trace!(
                    maker_id = maker.id(),
                    taker_id = order.id(),
                    quantity = taker_quantity,
                    price_ticks = level.price_ticks(),
                    "taker filled against partial maker"
                );
            }
        }
    }

    /// Resolve or create the level for `(side, price_ticks)`.
    fn get_or_create_level(
        &self,
        symbol: &Symbol,
        price_ticks: u64,
        side: Side,
    ) -> Option<NonNull<PriceLevel>> {
        let table = symbol.table(side);
        if let Some(level) = table.lookup(price_ticks) {
            return Some(level);
        }

        let slot = self.levels.allocate().ok()?;
        unsafe { slot.as_ptr().write(PriceLevel::new(price_ticks, self.levels.handle())) };

        if table.install(slot) {
            Some(slot)
        } else {
            // Lost the install race (or the table is full): discard ours
            // and use whatever is in the table now.
            unsafe {
                std::ptr::drop_in_place(slot.as_ptr());
                self.levels.deallocate(slot);
            }
            table.lookup(price_ticks)
        }
    }

    /// Monotone top-of-book improvement after resting an order.
    fn update_best_price(&self, symbol: &Symbol, price_ticks: u64, side: Side) {
        let cell = symbol.best_cell(side);
        while self.running.load(Ordering::Acquire) {
            let current = cell.load(Ordering::Acquire);
            let no_improvement = match side {
                Side::Buy => price_ticks <= current,
                Side::Sell => price_ticks >= current,
            };
            if no_improvement
                || cell
                    .compare_exchange(current, price_ticks, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return;
            }
        }
    }

    /// Walk inward from a stale top-of-book looking for the next active
    /// level, bounded by [`BACKTRACK_TICKS`]. Finding nothing resets the
    /// cell to the side's empty sentinel; if the true best lies further
    /// inward, the next insert there repairs it through
    /// [`Worker::update_best_price`]. A lost CAS re-runs against the fresh
    /// value.
    fn backtrack_top(&self, symbol: &Symbol, side: Side) {
        let cell = symbol.best_cell(side);
        let table = symbol.table(side);
        let empty = Symbol::empty_sentinel(side);

        while self.running.load(Ordering::Acquire) {
            let prev = cell.load(Ordering::Acquire);
            if prev == empty || table.is_active(prev) {
                return;
            }

            let mut candidate = None;
            match side {
                Side::Buy => {
                    let floor = prev.saturating_sub(BACKTRACK_TICKS);
                    for tick in (floor..prev).rev() {
                        if table.is_active(tick) {
                            candidate = Some(tick);
                            break;
                        }
                    }
                }
                Side::Sell => {
                    let ceiling = prev.saturating_add(BACKTRACK_TICKS);
                    for tick in (prev + 1)..=ceiling {
                        if table.is_active(tick) {
                            candidate = Some(tick);
                            break;
                        }
                    }
                }
            }

            let replacement = candidate.unwrap_or(empty);
            if cell
                .compare_exchange(prev, replacement, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if candidate.is_none() {
                    trace!(symbol = symbol.id(), %side, "top-of-book reset to empty");
                }
                return;
            }
            // Lost the race; retry against the fresh value.
        }
    }
}

/// Whether the incoming order crosses the opposing best price.
fn can_cross(best_ticks: u64, order: &Order) -> bool {
    if best_ticks == super::symbol::NO_BID_TICKS || best_ticks == super::symbol::NO_ASK_TICKS {
        return false;
    }
    match order.side() {
        Side::Buy => order.price_ticks() >= best_ticks,
        Side::Sell => order.price_ticks() <= best_ticks,
    }
}
