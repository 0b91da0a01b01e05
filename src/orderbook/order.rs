//! Orders, sides, lifecycle states and the client-facing order handle.

use super::symbol::Symbol;
use crate::arena::PoolHandle;
use crate::deque::Node;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Bits reserved for the per-thread sequence in an order id.
const SEQ_BITS: u32 = 48;
const SEQ_MASK: u64 = (1 << SEQ_BITS) - 1;

/// Node type carried by every price-level queue.
pub(crate) type OrderNode = Node<*mut Order>;

/// Which side of the book an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Bid side.
    Buy = 0,
    /// Ask side.
    Sell = 1,
}

impl Side {
    /// The side this order matches against.
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle of an order, kept in an atomic cell.
///
/// `Pending` is a published ADD not yet linked into a level.  `Resting` is
/// linked and cancellable.  `Matching` is a momentary claim a worker takes
/// while consuming the order, which is also what makes cancel-versus-match
/// races single-winner.  `CancelRequested` means a cancel was accepted and
/// published; the order is past the point of no return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OrderState {
    /// Published, not yet processed by a worker.
    Pending = 0,
    /// Resting in a price level; a cancel will be accepted.
    Resting = 1,
    /// Claimed by a matching worker.
    Matching = 2,
    /// Cancel accepted and in flight.
    CancelRequested = 3,
}

impl OrderState {
    fn from_u8(value: u8) -> OrderState {
        match value {
            0 => OrderState::Pending,
            1 => OrderState::Resting,
            2 => OrderState::Matching,
            _ => OrderState::CancelRequested,
        }
    }
}

/// Build an order id from the owning symbol and a per-thread sequence.
///
/// The high 16 bits carry the symbol id. The low 48 bits are a per-thread
/// counter, so ids are unique per submitting thread but not globally
/// ordered; nothing in the engine relies on id ordering.
#[inline]
pub fn make_order_id(symbol_id: u16, local_seq: u64) -> u64 {
    (u64::from(symbol_id) << SEQ_BITS) | (local_seq & SEQ_MASK)
}

/// Extract the symbol id an order id was minted for.
#[inline]
pub fn symbol_id_of(order_id: u64) -> u16 {
    (order_id >> SEQ_BITS) as u16
}

/// A single order record.
///
/// Identity fields (`user_id`, `side`, `price_ticks`, `symbol_id`) are
/// written once before the order is published and never change. Quantity,
/// lifecycle state, the resting node pointer and the reference count are
/// atomics shared between the submitting client, the matching workers and
/// the cancel path.
///
/// `refs` counts the live references to the slot: the in-flight ring
/// message or resting queue link, plus an extra one while a cancel message
/// is in flight. The thread that drops the count to zero returns the slot
/// to the order arena; that makes the free single-winner even when a cancel
/// races the matcher.
pub struct Order {
    id: AtomicU64,
    user_id: u32,
    side: Side,
    quantity: AtomicU32,
    price_ticks: u64,
    symbol_id: u16,
    symbol: *const Symbol,
    state: AtomicU8,
    node: AtomicPtr<OrderNode>,
    refs: AtomicU32,
    owner: PoolHandle,
}

unsafe impl Send for Order {}
unsafe impl Sync for Order {}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        user_id: u32,
        side: Side,
        quantity: u32,
        price_ticks: u64,
        symbol_id: u16,
        symbol: *const Symbol,
        owner: PoolHandle,
    ) -> Order {
        Order {
            id: AtomicU64::new(id),
            user_id,
            side,
            quantity: AtomicU32::new(quantity),
            price_ticks,
            symbol_id,
            symbol,
            state: AtomicU8::new(OrderState::Pending as u8),
            node: AtomicPtr::new(std::ptr::null_mut()),
            refs: AtomicU32::new(1),
            owner,
        }
    }

    /// The order id this slot currently carries.
    pub fn id(&self) -> u64 {
        self.id.load(Ordering::Acquire)
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn price_ticks(&self) -> u64 {
        self.price_ticks
    }

    pub fn symbol_id(&self) -> u16 {
        self.symbol_id
    }

    /// Remaining (unfilled) quantity.
    pub fn remaining_quantity(&self) -> u32 {
        self.quantity.load(Ordering::Acquire)
    }

    pub fn state(&self) -> OrderState {
        OrderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn symbol(&self) -> *const Symbol {
        self.symbol
    }

    /// Subtract a fill from the remaining quantity.
    pub(crate) fn fill(&self, quantity: u32) {
        debug_assert!(quantity <= self.remaining_quantity());
        self.quantity.fetch_sub(quantity, Ordering::AcqRel);
    }

    pub(crate) fn zero_quantity(&self) {
        self.quantity.store(0, Ordering::Release);
    }

    /// Transition `Pending`/`Matching` → `Resting` once the order is linked
    /// (or relinked) into a level. Publishes the node pointer written just
    /// before.
    pub(crate) fn finish_rest(&self) {
        self.state.store(OrderState::Resting as u8, Ordering::Release);
    }

    /// Worker-side claim of a popped maker. Fails iff a cancel is already
    /// in flight, in which case the cancel path owns the order's fate.
    pub(crate) fn begin_match(&self) -> bool {
        self.state
            .compare_exchange(
                OrderState::Resting as u8,
                OrderState::Matching as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Client-side cancel acceptance: only a resting order can move to
    /// `CancelRequested`, and only once.
    pub(crate) fn request_cancel(&self) -> bool {
        self.state
            .compare_exchange(
                OrderState::Resting as u8,
                OrderState::CancelRequested as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn node(&self) -> *mut OrderNode {
        self.node.load(Ordering::Acquire)
    }

    pub(crate) fn set_node(&self, node: *mut OrderNode) {
        self.node.store(node, Ordering::Release);
    }

    /// Publish that the resting node has been consumed, before it is
    /// retired. The cancel path validates its node pointer against this
    /// cell, so the SeqCst store orders it ahead of the retirement.
    pub(crate) fn clear_node(&self) {
        self.node.store(std::ptr::null_mut(), Ordering::SeqCst);
    }

    /// Add a reference for a newly published cancel message.
    pub(crate) fn acquire_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference; the last one out frees the slot.
    ///
    /// # Safety
    /// `ptr` must point at a live order slot, and the caller must actually
    /// hold one of its references.
    pub(crate) unsafe fn release_ref(ptr: *mut Order) {
        unsafe {
            if (*ptr).refs.fetch_sub(1, Ordering::AcqRel) == 1 {
                // Invalidate the slot's identity so stale handles read
                // `None` instead of a dead order's last state.
                (*ptr).id.store(u64::MAX, Ordering::Release);
                let owner = (*ptr).owner;
                owner.release(ptr as *mut u8);
            }
        }
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("id", &self.id())
            .field("user_id", &self.user_id)
            .field("side", &self.side)
            .field("price_ticks", &self.price_ticks)
            .field("remaining", &self.remaining_quantity())
            .field("state", &self.state())
            .finish()
    }
}

/// Client-side reference to a submitted order.
///
/// Returned by `submit_order` and consumed by `cancel_order`. The handle
/// snapshots the immutable identity (id, price, side) at submission; the
/// live accessors re-validate the id against the slot and return `None`
/// once the order has completed and its slot was recycled for a new order.
///
/// A handle does not keep the order alive: an order is gone once it fully
/// matches or its cancel is processed.
#[derive(Clone, Copy, Debug)]
pub struct OrderHandle {
    ptr: NonNull<Order>,
    id: u64,
    price_ticks: u64,
    side: Side,
}

unsafe impl Send for OrderHandle {}
unsafe impl Sync for OrderHandle {}

impl OrderHandle {
    pub(crate) fn new(ptr: NonNull<Order>, id: u64, price_ticks: u64, side: Side) -> Self {
        OrderHandle {
            ptr,
            id,
            price_ticks,
            side,
        }
    }

    pub(crate) fn order_ptr(&self) -> NonNull<Order> {
        self.ptr
    }

    /// The order id, with the symbol id in the high 16 bits.
    pub fn order_id(&self) -> u64 {
        self.id
    }

    /// Price in ticks, as submitted.
    pub fn price_ticks(&self) -> u64 {
        self.price_ticks
    }

    pub fn side(&self) -> Side {
        self.side
    }

    fn live(&self) -> Option<&Order> {
        let order = unsafe { self.ptr.as_ref() };
        (order.id() == self.id).then_some(order)
    }

    /// Remaining quantity, or `None` once the slot no longer carries this
    /// order.
    pub fn remaining_quantity(&self) -> Option<u32> {
        self.live().map(Order::remaining_quantity)
    }

    /// Whether the order has rested in the book (and is therefore
    /// cancellable until it fully matches).
    pub fn has_rested(&self) -> bool {
        self.live().is_some_and(|order| {
            matches!(
                order.state(),
                OrderState::Resting | OrderState::Matching | OrderState::CancelRequested
            )
        })
    }
}
