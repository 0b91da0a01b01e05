//! The deque proper: Sundell–Tsigas doubly linked list with two sentinels.

use super::marked::{AtomicMarkedPtr, MarkedPtr};
use super::node::{Node, reclaim};
use crate::arena::Arena;
use crate::hazard;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

/// Lock-free FIFO deque with middle removal.
///
/// Two permanent sentinels bracket the live nodes. Every link is a
/// [`MarkedPtr`]; setting the mark on a node's `next` is the linearization
/// point of its deletion, after which any thread can (and will) help splice
/// it out. Per-node hazard protection guards every dereference, and removed
/// nodes travel through the thread-local retire list back to the arena they
/// were allocated from.
///
/// The matcher uses `push_right` to rest orders, `pop_left` to consume them
/// in time priority, `push_left` to put a partially filled maker back at
/// the head of the line, and `remove_node` for cancels.
pub struct Deque<T> {
    head: *mut Node<T>,
    tail: *mut Node<T>,
}

unsafe impl<T: Send> Send for Deque<T> {}
unsafe impl<T: Send> Sync for Deque<T> {}

impl<T: Copy> Deque<T> {
    pub fn new() -> Self {
        let head = Box::into_raw(Box::new(Node::sentinel()));
        let tail = Box::into_raw(Box::new(Node::sentinel()));
        unsafe {
            (*head).next.store(MarkedPtr::new(tail, false), Ordering::Relaxed);
            (*tail).prev.store(MarkedPtr::new(head, false), Ordering::Relaxed);
        }
        Deque { head, tail }
    }

    /// True when no live node sits between the sentinels. Exact only in
    /// quiescence; concurrent callers get a snapshot.
    pub fn is_empty(&self) -> bool {
        unsafe { (*self.head).next.load(Ordering::Acquire).ptr() == self.tail }
    }

    /// Append `data` before the tail sentinel. Returns the new node, or
    /// `None` if the node arena is exhausted even after a reclamation scan.
    pub fn push_right(&self, data: T, arena: &Arena<Node<T>>) -> Option<NonNull<Node<T>>> {
        let node = self.create_node(data, arena)?;
        unsafe {
            // Guard the new node: a consumer may pop and retire it the
            // moment it is linked, while push_common still touches it.
            self.acquire_ref(node);
            let next = self.tail;
            loop {
                let prev = match self.protect_unmarked(&(*next).prev) {
                    Some(prev) => prev,
                    None => {
                        std::thread::yield_now();
                        continue;
                    }
                };
                if (*prev).next.load(Ordering::Acquire) != MarkedPtr::new(next, false) {
                    // tail.prev lags behind; repair it before retrying.
                    let fixed = self.help_insert(prev, next);
                    self.release_ref(fixed);
                    std::thread::yield_now();
                    continue;
                }
                (*node).prev.store(MarkedPtr::new(prev, false), Ordering::Relaxed);
                (*node).next.store(MarkedPtr::new(next, false), Ordering::Relaxed);
                let linked = (*prev)
                    .next
                    .compare_exchange(
                        MarkedPtr::new(next, false),
                        MarkedPtr::new(node, false),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok();
                self.release_ref(prev);
                if linked {
                    break;
                }
                std::thread::yield_now();
            }
            self.push_common(node, next);
            self.release_ref(node);
            Some(NonNull::new_unchecked(node))
        }
    }

    /// Prepend `data` right after the head sentinel.
    pub fn push_left(&self, data: T, arena: &Arena<Node<T>>) -> Option<NonNull<Node<T>>> {
        let node = self.create_node(data, arena)?;
        unsafe {
            self.acquire_ref(node);
            let prev = self.head;
            let next;
            loop {
                let candidate = match self.protect_unmarked(&(*prev).next) {
                    Some(candidate) => candidate,
                    None => {
                        std::thread::yield_now();
                        continue;
                    }
                };
                (*node).prev.store(MarkedPtr::new(prev, false), Ordering::Relaxed);
                (*node).next.store(MarkedPtr::new(candidate, false), Ordering::Relaxed);
                if (*prev)
                    .next
                    .compare_exchange(
                        MarkedPtr::new(candidate, false),
                        MarkedPtr::new(node, false),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    next = candidate;
                    break;
                }
                self.release_ref(candidate);
                std::thread::yield_now();
            }
            self.push_common(node, next);
            self.release_ref(next);
            self.release_ref(node);
            Some(NonNull::new_unchecked(node))
        }
    }

    /// Pop the oldest node and retire it.
    pub fn pop_left(&self) -> Option<T> {
        let (data, node) = self.pop_left_entry()?;
        unsafe { self.retire_entry(node) };
        Some(data)
    }

    /// Pop the oldest node, deferring retirement to the caller.
    ///
    /// The caller owns the unlinked node's identity and must eventually pass
    /// it to [`Deque::retire_entry`], exactly once. The matcher uses this to
    /// publish "this node is consumed" before the node disappears.
    pub fn pop_left_entry(&self) -> Option<(T, NonNull<Node<T>>)> {
        unsafe {
            let prev = self.head;
            loop {
                let next = match self.protect_unmarked(&(*prev).next) {
                    Some(next) => next,
                    None => {
                        std::thread::yield_now();
                        continue;
                    }
                };
                if next == self.tail {
                    return None;
                }
                let next_link = (*next).next.load(Ordering::Acquire);
                if next_link.is_marked() {
                    // Someone else is mid-deletion; help and retry.
                    self.help_delete(next);
                    if let Some(after) = self.protect_any(&(*next).next) {
                        let fixed = self.help_insert(prev, after);
                        self.release_ref(fixed);
                        self.release_ref(after);
                    }
                    self.release_ref(next);
                    std::thread::yield_now();
                    continue;
                }
                if (*next)
                    .next
                    .compare_exchange(
                        next_link,
                        next_link.with_mark(),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    let data = (*next).read_data();
                    self.help_delete(next);
                    if let Some(after) = self.protect_any(&(*next).next) {
                        let fixed = self.help_insert(prev, after);
                        self.release_ref(fixed);
                        self.release_ref(after);
                    }
                    self.remove_cross_reference(next);
                    self.release_ref(next);
                    return Some((data, NonNull::new_unchecked(next)));
                }
                self.release_ref(next);
                std::thread::yield_now();
            }
        }
    }

    /// Pop the newest node and retire it.
    pub fn pop_right(&self) -> Option<T> {
        unsafe {
            let next = self.tail;
            loop {
                let prev = match self.protect_unmarked(&(*next).prev) {
                    Some(prev) => prev,
                    None => {
                        std::thread::yield_now();
                        continue;
                    }
                };
                if prev == self.head {
                    self.release_ref(prev);
                    return None;
                }
                let prev_next = (*prev).next.load(Ordering::Acquire);
                if prev_next.is_marked() {
                    self.help_delete(prev);
                    self.release_ref(prev);
                    continue;
                }
                if prev_next.ptr() != next {
                    // prev is no longer the rightmost live node.
                    let fixed = self.help_insert(prev, next);
                    self.release_ref(fixed);
                    continue;
                }
                if (*prev)
                    .next
                    .compare_exchange(
                        MarkedPtr::new(next, false),
                        MarkedPtr::new(next, true),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    let data = (*prev).read_data();
                    self.help_delete(prev);
                    if let Some(before) = self.protect_any(&(*prev).prev) {
                        let fixed = self.help_insert(before, next);
                        self.release_ref(fixed);
                    }
                    self.remove_cross_reference(prev);
                    self.release_ref(prev);
                    self.retire_entry(NonNull::new_unchecked(prev));
                    return Some(data);
                }
                self.release_ref(prev);
                std::thread::yield_now();
            }
        }
    }

    /// Unlink a specific node.
    ///
    /// Returns the payload if this call won the deletion, `None` if the node
    /// was already (or concurrently) removed. The node is retired here on
    /// success.
    ///
    /// # Safety
    /// `node` must be a node of this deque, and the caller must guarantee it
    /// has not been reclaimed — either via a hazard protection of its own or
    /// by holding the only path that retires it.
    pub unsafe fn remove_node(&self, node: *mut Node<T>) -> Option<T> {
        if node.is_null() || self.is_sentinel(node) {
            return None;
        }
        unsafe {
            loop {
                let link = (*node).next.load(Ordering::Acquire);
                if link.is_marked() {
                    return None;
                }
                if (*node)
                    .next
                    .compare_exchange(link, link.with_mark(), Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    let data = (*node).read_data();
                    self.help_delete(node);
                    self.remove_cross_reference(node);
                    self.retire_entry(NonNull::new_unchecked(node));
                    return Some(data);
                }
                std::thread::yield_now();
            }
        }
    }

    /// Hand an unlinked node to the retire list.
    ///
    /// # Safety
    /// `node` must have been returned by [`Deque::pop_left_entry`] on this
    /// deque and not retired yet.
    pub unsafe fn retire_entry(&self, node: NonNull<Node<T>>) {
        let node = node.as_ptr();
        debug_assert!(!self.is_sentinel(node));
        unsafe {
            if (*node).mark_retired() {
                hazard::retire(node as *mut (), reclaim::<T>);
            }
        }
    }

    fn create_node(&self, data: T, arena: &Arena<Node<T>>) -> Option<*mut Node<T>> {
        let slot = match arena.allocate() {
            Ok(slot) => slot,
            Err(_) => {
                // A reclamation scan may hand nodes back to the arena.
                hazard::scan();
                arena.allocate().ok()?
            }
        };
        unsafe { slot.as_ptr().write(Node::new(data, arena.handle())) };
        Some(slot.as_ptr())
    }

    #[inline]
    fn is_sentinel(&self, node: *mut Node<T>) -> bool {
        node == self.head || node == self.tail
    }

    /// Publish a protection for `node`. Sentinels are owned by the deque and
    /// never reclaimed, so they are not protected.
    #[inline]
    fn acquire_ref(&self, node: *mut Node<T>) {
        if !node.is_null() && !self.is_sentinel(node) {
            hazard::protect(node as *mut ());
        }
    }

    #[inline]
    fn release_ref(&self, node: *mut Node<T>) {
        if !node.is_null() && !self.is_sentinel(node) {
            hazard::unprotect(node as *mut ());
        }
    }

    /// Protected load through `cell`, failing on a marked or null link.
    ///
    /// The protection is published first and the cell re-read to validate
    /// that the pointer is still reachable; only then may the node be
    /// dereferenced. Returns the protected node.
    unsafe fn protect_unmarked(&self, cell: &AtomicMarkedPtr<Node<T>>) -> Option<*mut Node<T>> {
        loop {
            let link = cell.load(Ordering::Acquire);
            if link.is_marked() {
                return None;
            }
            let node = link.ptr();
            if node.is_null() {
                return None;
            }
            self.acquire_ref(node);
            let revalidated = cell.load(Ordering::Acquire);
            if revalidated.ptr() != node || revalidated.is_marked() {
                self.release_ref(node);
                if revalidated.is_marked() {
                    return None;
                }
                std::thread::yield_now();
                continue;
            }
            if unsafe { (*node).is_retired() } {
                self.release_ref(node);
                return None;
            }
            return Some(node);
        }
    }

    /// Protected load through `cell`, ignoring the mark. Used to walk the
    /// back-links of nodes that are themselves being deleted.
    unsafe fn protect_any(&self, cell: &AtomicMarkedPtr<Node<T>>) -> Option<*mut Node<T>> {
        loop {
            let link = cell.load(Ordering::Acquire);
            let node = link.ptr();
            if node.is_null() {
                return None;
            }
            self.acquire_ref(node);
            if cell.load(Ordering::Acquire).ptr() != node {
                self.release_ref(node);
                std::thread::yield_now();
                continue;
            }
            if unsafe { (*node).is_retired() } {
                self.release_ref(node);
                return None;
            }
            return Some(node);
        }
    }

    /// Set the deletion mark on `node.prev`, telling traversals the link is
    /// no longer usable.
    unsafe fn mark_prev(&self, node: *mut Node<T>) {
        unsafe {
            loop {
                let link = (*node).prev.load(Ordering::Acquire);
                if link.is_marked()
                    || (*node)
                        .prev
                        .compare_exchange_weak(
                            link,
                            link.with_mark(),
                            Ordering::AcqRel,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                {
                    return;
                }
            }
        }
    }

    /// Second half of an insertion: swing `next.prev` to the new node, and
    /// help out if the new node got marked in the meantime. Idempotent and
    /// safe to race with other helpers.
    ///
    /// Caller keeps its protections on `node` and `next`.
    unsafe fn push_common(&self, node: *mut Node<T>, next: *mut Node<T>) {
        unsafe {
            loop {
                let link = (*next).prev.load(Ordering::Acquire);
                if link.is_marked() || (*node).next.load(Ordering::Acquire) != MarkedPtr::new(next, false)
                {
                    break;
                }
                if (*next)
                    .prev
                    .compare_exchange_weak(
                        link,
                        MarkedPtr::new(node, false),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    if (*node).prev.load(Ordering::Acquire).is_marked() {
                        // The new node is already being deleted; repair
                        // next.prev to skip it. The extra protection feeds
                        // help_insert, which consumes its first argument's.
                        self.acquire_ref(node);
                        let fixed = self.help_insert(node, next);
                        self.release_ref(fixed);
                    }
                    break;
                }
                std::thread::yield_now();
            }
        }
    }

    /// Walk forward from `from` to the live predecessor of `node` and CAS
    /// `node.prev` to it.
    ///
    /// Protection contract: the caller's protection on `from` is consumed
    /// (released on every step); the returned pointer is protected and must
    /// be released by the caller. `node` must be protected by the caller and
    /// is left untouched.
    unsafe fn help_insert(&self, mut prev: *mut Node<T>, node: *mut Node<T>) -> *mut Node<T> {
        unsafe {
            let mut last_mark = true;
            loop {
                let prev2 = match self.protect_unmarked(&(*prev).next) {
                    Some(prev2) => prev2,
                    None => {
                        // prev.next is marked: prev is being deleted too.
                        if !last_mark {
                            self.help_delete(prev);
                            last_mark = true;
                        }
                        match self.protect_any(&(*prev).prev) {
                            Some(stepped) => {
                                self.release_ref(prev);
                                prev = stepped;
                                continue;
                            }
                            None => break,
                        }
                    }
                };
                let link = (*node).prev.load(Ordering::Acquire);
                if link.is_marked() {
                    self.release_ref(prev2);
                    break;
                }
                if prev2 != node {
                    last_mark = (*prev).next.load(Ordering::Acquire).is_marked();
                    self.release_ref(prev);
                    prev = prev2;
                    continue;
                }
                self.release_ref(prev2);
                if (*node)
                    .prev
                    .compare_exchange_weak(
                        link,
                        MarkedPtr::new(prev, false),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    if (*prev).prev.load(Ordering::Acquire).is_marked() {
                        continue;
                    }
                    break;
                }
                std::thread::yield_now();
            }
            prev
        }
    }

    /// Complete the deletion of a marked node: mark its prev link, then
    /// splice `prev.next` past it. Any thread may run this for any marked
    /// node; all the CASes tolerate repetition.
    ///
    /// Caller must hold a protection on `node` (or own its liveness).
    unsafe fn help_delete(&self, node: *mut Node<T>) {
        if node.is_null() || self.is_sentinel(node) {
            return;
        }
        unsafe {
            self.mark_prev(node);
            let Some(mut prev) = self.protect_any(&(*node).prev) else {
                return;
            };
            let Some(mut next) = self.protect_any(&(*node).next) else {
                self.release_ref(prev);
                return;
            };
            let mut last_mark = true;
            loop {
                if prev == next {
                    break;
                }
                if (*next).next.load(Ordering::Acquire).is_marked() {
                    // Successor is deleted as well; skip over it.
                    match self.protect_any(&(*next).next) {
                        Some(next2) => {
                            self.release_ref(next);
                            next = next2;
                            continue;
                        }
                        None => break,
                    }
                }
                let prev2 = match self.protect_unmarked(&(*prev).next) {
                    Some(prev2) => prev2,
                    None => {
                        if !last_mark {
                            self.help_delete(prev);
                            last_mark = true;
                        }
                        match self.protect_any(&(*prev).prev) {
                            Some(stepped) => {
                                self.release_ref(prev);
                                prev = stepped;
                                continue;
                            }
                            None => break,
                        }
                    }
                };
                if prev2 != node {
                    last_mark = false;
                    self.release_ref(prev);
                    prev = prev2;
                    continue;
                }
                self.release_ref(prev2);
                if (*prev)
                    .next
                    .compare_exchange(
                        MarkedPtr::new(node, false),
                        MarkedPtr::new(next, false),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    break;
                }
                std::thread::yield_now();
            }
            self.release_ref(prev);
            self.release_ref(next);
        }
    }

    /// After deletion, swing the dead node's own links off other dead nodes
    /// so chains of deleted nodes do not pin each other until the last
    /// reclamation.
    unsafe fn remove_cross_reference(&self, node: *mut Node<T>) {
        unsafe {
            loop {
                let Some(prev) = self.protect_any(&(*node).prev) else {
                    break;
                };
                if !self.is_sentinel(prev) && (*prev).next.load(Ordering::Acquire).is_marked() {
                    match self.protect_any(&(*prev).prev) {
                        Some(prev2) => {
                            (*node).prev.store(MarkedPtr::new(prev2, true), Ordering::Release);
                            self.release_ref(prev2);
                            self.release_ref(prev);
                            continue;
                        }
                        None => {
                            self.release_ref(prev);
                            break;
                        }
                    }
                }
                self.release_ref(prev);

                let Some(next) = self.protect_any(&(*node).next) else {
                    break;
                };
                if !self.is_sentinel(next) && (*next).next.load(Ordering::Acquire).is_marked() {
                    match self.protect_any(&(*next).next) {
                        Some(next2) => {
                            (*node).next.store(MarkedPtr::new(next2, true), Ordering::Release);
                            self.release_ref(next2);
                            self.release_ref(next);
                            continue;
                        }
                        None => {
                            self.release_ref(next);
                            break;
                        }
                    }
                }
                self.release_ref(next);
                break;
            }
        }
    }
}

impl<T: Copy> Default for Deque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Deque<T> {
    fn drop(&mut self) {
        // Exclusive access at this point: no concurrent operations, no
        // hazards to honor. Remaining live nodes go straight back to their
        // arenas; retired nodes are on retire lists and are not reachable
        // from here.
        unsafe {
            let mut cursor = (*self.head).next.load(Ordering::Relaxed).ptr();
            while !cursor.is_null() && cursor != self.tail {
                let next = (*cursor).next.load(Ordering::Relaxed).ptr();
                reclaim::<T>(cursor as *mut ());
                cursor = next;
            }
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.tail));
        }
    }
}
