//! The arena itself: a preallocated slab recycled through the free list.

use super::free_list::FreeList;
use super::remote::RemoteFreeRing;
use crate::utils::thread_token;
use crossbeam::utils::Backoff;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::trace;

/// Returned by [`Arena::allocate`] when every slot is live even after
/// draining the remote-free channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("arena exhausted")]
pub struct ArenaExhausted;

/// Fixed pool of `capacity` slots of `T`.
///
/// One arena is conceptually owned by one thread (its *home*). The home
/// thread pushes returned slots straight onto the local free list; any
/// other thread routes the return through the arena's [`RemoteFreeRing`],
/// and pending returns are folded back in at the next allocation. Slots
/// are handed out uninitialized; callers `ptr::write` into them and are
/// responsible for dropping the payload before release.
///
/// All operations are lock-free. The free list is safe to pop from any
/// thread, which the book relies on: orders are allocated by whichever
/// client thread is submitting.
pub struct Arena<T> {
    slab: Box<[UnsafeCell<MaybeUninit<T>>]>,
    free: FreeList,
    remote: RemoteFreeRing,
    home: AtomicU64,
    outstanding: AtomicUsize,
}

// The arena hands out raw slots and recycles them through atomics; the
// payload type decides whether that is transferable across threads.
unsafe impl<T: Send> Send for Arena<T> {}
unsafe impl<T: Send> Sync for Arena<T> {}

impl<T> Arena<T> {
    /// Preallocate an arena of `capacity` slots, homed on the calling
    /// thread.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "arena capacity must be non-zero");
        assert!(size_of::<T>() > 0, "arena payloads must be sized");

        let slab: Box<[UnsafeCell<MaybeUninit<T>>]> = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Arena {
            slab,
            free: FreeList::new(capacity),
            remote: RemoteFreeRing::new(capacity),
            home: AtomicU64::new(thread_token()),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Re-home the arena on the calling thread.
    ///
    /// Workers construct their arenas on the spawning thread and call this
    /// first thing in their run loop, so their own frees take the local
    /// path.
    pub fn bind_home(&self) {
        self.home.store(thread_token(), Ordering::Release);
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slab.len()
    }

    /// Slots not currently live. Returns pending in the remote-free ring
    /// count as unavailable until drained.
    pub fn available(&self) -> usize {
        self.capacity() - self.outstanding.load(Ordering::Acquire)
    }

    /// Claim a slot.
    ///
    /// Pending remote returns are drained first, then the free list is
    /// popped; an empty list after the drain is exhaustion. The returned
    /// pointer is uninitialized memory.
    pub fn allocate(&self) -> Result<NonNull<T>, ArenaExhausted> {
        self.drain_remote_free();
        match self.free.pop() {
            Some(idx) => {
                self.outstanding.fetch_add(1, Ordering::AcqRel);
                // Index came off the free list, so it is in range.
                let slot = self.slab[idx as usize].get();
                Ok(unsafe { NonNull::new_unchecked(slot.cast::<T>()) })
            }
            None => {
                trace!(capacity = self.capacity(), "arena exhausted");
                Err(ArenaExhausted)
            }
        }
    }

    /// Return a slot to the arena.
    ///
    /// From the home thread this is a free-list push; from anywhere else
    /// the index goes through the remote-free ring, yielding while the ring
    /// is momentarily full.
    ///
    /// # Safety
    /// `ptr` must have come from [`Arena::allocate`] on this arena, the
    /// payload must already be dropped (or trivially droppable), and the
    /// slot must not be used again by the caller.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>) {
        let idx = self.index_of(ptr);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if self.home.load(Ordering::Acquire) == thread_token() {
            self.free.push(idx);
        } else {
            let backoff = Backoff::new();
            while !self.remote.push(idx) {
                backoff.snooze();
            }
        }
    }

    /// Fold every pending remote return back onto the free list.
    pub fn drain_remote_free(&self) {
        while let Some(idx) = self.remote.pop() {
            self.free.push(idx);
        }
    }

    /// True when no pending remote returns exist.
    pub fn remote_free_is_empty(&self) -> bool {
        self.remote.is_empty()
    }

    /// Type-erased release path for objects that outlive the code that
    /// knows this arena's concrete type.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            pool: self as *const Arena<T> as *const (),
            release: release_erased::<T>,
        }
    }

    fn index_of(&self, ptr: NonNull<T>) -> u32 {
        let base = self.slab.as_ptr() as usize;
        let offset = ptr.as_ptr() as usize - base;
        debug_assert_eq!(offset % size_of::<UnsafeCell<MaybeUninit<T>>>(), 0);
        let idx = offset / size_of::<UnsafeCell<MaybeUninit<T>>>();
        debug_assert!(idx < self.slab.len(), "pointer outside arena slab");
        idx as u32
    }
}

unsafe fn release_erased<T>(pool: *const (), ptr: *mut u8) {
    let arena = unsafe { &*(pool as *const Arena<T>) };
    unsafe { arena.deallocate(NonNull::new_unchecked(ptr as *mut T)) };
}

unsafe fn release_nothing(_pool: *const (), _ptr: *mut u8) {}

/// Type-erased handle routing a slot back to its owning [`Arena`].
///
/// The handle is a context pointer plus a monomorphized release fn, the
/// role a `GenericMemoryPool` vtable plays in classic pool designs. It is
/// only valid while the arena it points at is alive; the engine guarantees
/// that by tearing symbols down before dropping workers.
#[derive(Clone, Copy)]
pub struct PoolHandle {
    pool: *const (),
    release: unsafe fn(*const (), *mut u8),
}

unsafe impl Send for PoolHandle {}
unsafe impl Sync for PoolHandle {}

impl PoolHandle {
    /// A handle that discards releases. Used by deque sentinels, which are
    /// owned by their deque rather than an arena.
    pub fn null() -> Self {
        PoolHandle {
            pool: std::ptr::null(),
            release: release_nothing,
        }
    }

    /// Return `ptr` to the arena this handle was created from.
    ///
    /// # Safety
    /// Same contract as [`Arena::deallocate`], and the arena must still be
    /// alive.
    pub unsafe fn release(&self, ptr: *mut u8) {
        unsafe { (self.release)(self.pool, ptr) };
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle").field("pool", &self.pool).finish()
    }
}
