//! Lock-free fixed-capacity slab pool
//!
//! A typed slab of cache-line-aligned slots threaded onto an intrusive free
//! list of slot indices. `try_insert` pops a slot with a weak-CAS loop and
//! places the value in it; dropping the returned guard (or consuming it with
//! `into_inner`) pushes the slot back. No allocation happens after
//! construction and no operation takes a lock or syscall.
//!
//! Ordering contract: the free-list head is popped with an acquire load and
//! pushed with a release CAS, so writes into a slot made before release are
//! visible to the next acquirer. Spurious weak-CAS failures just retry.
//!
//! The pool is `Clone` (shared handle); guards keep the pool alive, so a
//! leaked guard leaks its slot until process exit. That is tolerated and
//! visible as a non-zero steady-state `in_use`.
//!
//! The free list is linked in reverse at construction so the first
//! acquisitions walk the slab front to back, keeping early slots
//! cache-adjacent.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;

const NIL: usize = usize::MAX;

/// One storage cell. `next` is only written while the slot is off the free
/// list (by its releaser) or during construction.
#[repr(C, align(64))]
struct Slot<T> {
    next: UnsafeCell<usize>,
    value: UnsafeCell<MaybeUninit<T>>,
}

struct PoolInner<T> {
    slots: Box<[Slot<T>]>,
    free_head: CachePadded<AtomicUsize>,
    allocations: CachePadded<AtomicU64>,
    deallocations: CachePadded<AtomicU64>,
    failures: CachePadded<AtomicU64>,
}

// Safety: a slot's value cell is touched only by the unique guard holding
// its index; the CAS protocol on free_head serialises index ownership.
unsafe impl<T: Send> Send for PoolInner<T> {}
unsafe impl<T: Send> Sync for PoolInner<T> {}

/// Shared handle to a fixed-capacity slab pool.
pub struct SlabPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for SlabPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Counter snapshot; `in_use` is derived, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub allocations: u64,
    pub deallocations: u64,
    pub failures: u64,
    pub in_use: u64,
}

impl<T: Send> SlabPool<T> {
    /// Build a pool of `capacity` slots, all initially free.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be non-zero");

        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|_| Slot {
                next: UnsafeCell::new(NIL),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        // Link in reverse so the head ends at slot 0.
        let mut head = NIL;
        for i in (0..capacity).rev() {
            unsafe {
                *slots[i].next.get() = head;
            }
            head = i;
        }

        Self {
            inner: Arc::new(PoolInner {
                slots,
                free_head: CachePadded::new(AtomicUsize::new(head)),
                allocations: CachePadded::new(AtomicU64::new(0)),
                deallocations: CachePadded::new(AtomicU64::new(0)),
                failures: CachePadded::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Acquire a slot and move `value` into it.
    ///
    /// Returns `None` (and counts a failure) when the pool is exhausted; the
    /// value is returned to the caller via drop in that case.
    #[inline]
    pub fn try_insert(&self, value: T) -> Option<PoolGuard<T>> {
        let Some(index) = self.pop_slot() else {
            self.inner.failures.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        unsafe {
            (*self.inner.slots[index].value.get()).write(value);
        }
        self.inner.allocations.fetch_add(1, Ordering::Relaxed);

        Some(PoolGuard {
            pool: self.clone(),
            index,
        })
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    /// Counter snapshot (relaxed reads; advisory).
    pub fn stats(&self) -> PoolStats {
        let allocations = self.inner.allocations.load(Ordering::Relaxed);
        let deallocations = self.inner.deallocations.load(Ordering::Relaxed);
        PoolStats {
            allocations,
            deallocations,
            failures: self.inner.failures.load(Ordering::Relaxed),
            in_use: allocations - deallocations,
        }
    }

    #[inline]
    fn pop_slot(&self) -> Option<usize> {
        let mut head = self.inner.free_head.load(Ordering::Acquire);
        loop {
            if head == NIL {
                return None;
            }
            let next = unsafe { *self.inner.slots[head].next.get() };
            match self.inner.free_head.compare_exchange_weak(
                head,
                next,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(head),
                Err(current) => head = current,
            }
        }
    }

    #[inline]
    fn push_slot(&self, index: usize) {
        let mut head = self.inner.free_head.load(Ordering::Acquire);
        loop {
            unsafe {
                *self.inner.slots[index].next.get() = head;
            }
            match self.inner.free_head.compare_exchange_weak(
                head,
                index,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.inner.deallocations.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(current) => head = current,
            }
        }
    }
}

/// RAII handle to one occupied slot. Dropping it returns the slot.
pub struct PoolGuard<T: Send> {
    pool: SlabPool<T>,
    index: usize,
}

unsafe impl<T: Send> Send for PoolGuard<T> {}

impl<T: Send> PoolGuard<T> {
    /// Move the value out and release the slot.
    pub fn into_inner(self) -> T {
        let value = unsafe { (*self.pool.inner.slots[self.index].value.get()).assume_init_read() };
        self.pool.push_slot(self.index);
        std::mem::forget(self);
        value
    }
}

impl<T: Send> Deref for PoolGuard<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { (*self.pool.inner.slots[self.index].value.get()).assume_init_ref() }
    }
}

impl<T: Send> DerefMut for PoolGuard<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { (*self.pool.inner.slots[self.index].value.get()).assume_init_mut() }
    }
}

impl<T: Send + std::fmt::Debug> std::fmt::Debug for PoolGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("index", &self.index)
            .field("value", &**self)
            .finish()
    }
}

impl<T: Send> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        unsafe {
            std::ptr::drop_in_place((*self.pool.inner.slots[self.index].value.get()).as_mut_ptr());
        }
        self.pool.push_slot(self.index);
    }
}
