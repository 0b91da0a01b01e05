//! Deque nodes.

use super::marked::{AtomicMarkedPtr, MarkedPtr};
use crate::arena::PoolHandle;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};

/// A doubly linked node holding one payload by value.
///
/// Both links are [`AtomicMarkedPtr`]s; a set mark on `next` means the node
/// is logically deleted. Sentinel nodes belong to their deque and carry no
/// payload; regular nodes come out of an arena and carry a [`PoolHandle`]
/// routing them home when reclaimed.
pub struct Node<T> {
    pub(crate) prev: AtomicMarkedPtr<Node<T>>,
    pub(crate) next: AtomicMarkedPtr<Node<T>>,
    data: UnsafeCell<MaybeUninit<T>>,
    retired: AtomicBool,
    owner: PoolHandle,
}

unsafe impl<T: Send> Send for Node<T> {}
unsafe impl<T: Send> Sync for Node<T> {}

impl<T> Node<T> {
    /// A payload-less sentinel. Sentinels are never retired; the deque frees
    /// them in its `Drop`.
    pub(crate) fn sentinel() -> Self {
        Node {
            prev: AtomicMarkedPtr::new(MarkedPtr::null()),
            next: AtomicMarkedPtr::new(MarkedPtr::null()),
            data: UnsafeCell::new(MaybeUninit::uninit()),
            retired: AtomicBool::new(false),
            owner: PoolHandle::null(),
        }
    }

    /// A regular node carrying `data`, owned by the arena behind `owner`.
    pub(crate) fn new(data: T, owner: PoolHandle) -> Self {
        Node {
            prev: AtomicMarkedPtr::new(MarkedPtr::null()),
            next: AtomicMarkedPtr::new(MarkedPtr::null()),
            data: UnsafeCell::new(MaybeUninit::new(data)),
            retired: AtomicBool::new(false),
            owner,
        }
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Flag the node retired. Returns true for the caller that got there
    /// first; only that caller may hand the node to the retire list.
    pub(crate) fn mark_retired(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }

    /// Read the payload.
    ///
    /// # Safety
    /// Only valid on non-sentinel nodes, and only while the node is
    /// protected or otherwise known to be alive.
    pub(crate) unsafe fn read_data(&self) -> T
    where
        T: Copy,
    {
        unsafe { (*self.data.get()).assume_init() }
    }
}

/// Reclaimer handed to the retire list: returns the node's slot to the
/// arena it came from. Payloads are `Copy` order pointers, so there is no
/// drop glue to run.
pub(crate) unsafe fn reclaim<T>(ptr: *mut ()) {
    let node = ptr as *mut Node<T>;
    let owner = unsafe { (*node).owner };
    unsafe { owner.release(node as *mut u8) };
}
