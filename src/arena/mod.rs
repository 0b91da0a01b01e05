//! Fixed-capacity object pools with cross-thread return channels.
//!
//! Every allocation the engine performs on the order path comes out of an
//! [`Arena`]: a preallocated slab of slots recycled through a LIFO free
//! list. Arenas have a *home* thread (normally the worker that owns them);
//! a thread returning a slot it does not own routes it through a bounded
//! [`RemoteFreeRing`] instead of touching the owner's free list, and the
//! owner folds those returns back in when it next allocates.
//!
//! [`PoolHandle`] is a type-erased return path: objects that must be freed
//! far from the arena that produced them (deque nodes, resting orders,
//! price levels) carry one so the reclaiming code does not need to know the
//! concrete arena type.

mod free_list;
mod pool;
mod remote;

pub use pool::{Arena, ArenaExhausted, PoolHandle};
pub use remote::RemoteFreeRing;
