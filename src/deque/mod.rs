//! Lock-free doubly linked FIFO deque.
//!
//! This is the queue behind every price level: orders rest at the right end
//! and are consumed from the left in strict arrival order, with arbitrary
//! middle removal for cancels. The algorithm is the doubly linked list of
//! Sundell and Tsigas (OPODIS'04), restricted to the operations the matcher
//! needs: deletion is a CAS that sets the least-significant mark bit on a
//! node's `next` link, after which helper routines splice the node out and
//! repair `prev` chains cooperatively.
//!
//! Reclamation is hazard-pointer based (see [`crate::hazard`]): every
//! dereference through an atomic link publishes the pointer and re-validates
//! the link before use, and unlinked nodes go through the thread-local
//! retire list back to the arena that produced them.

mod list;
mod marked;
mod node;

pub use list::Deque;
pub use marked::{AtomicMarkedPtr, MarkedPtr};
pub use node::Node;
