//! Lock-free single-producer single-consumer ring
//!
//! Bounded, wait-free handoff between the ingest thread and the consumer
//! thread. The layout keeps the three contended locations on separate cache
//! lines: the authoritative write index, the authoritative read index, and
//! the storage array. On top of that, each endpoint keeps a *cached* copy of
//! the opposite index in its own (thread-local) struct, so the fast path
//! touches no shared cache line owned by the other core:
//!
//! - the producer re-reads the consumer's `read` only when its cached copy
//!   says the ring looks full;
//! - the consumer re-reads the producer's `write` only when its cached copy
//!   says the ring looks empty.
//!
//! Capacity is fixed at construction and must be a power of two so the slot
//! index is a mask instead of a modulo. `T` must be `Copy`: elements cross
//! the boundary by value and never need dropping in place.
//!
//! Ordering contract: a successful `try_push(v)` happens-before the
//! `try_pop` that returns `v` (release store of `write`, acquire load on the
//! consumer side), and pushes are observed in push order.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;

struct Shared<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u64,
    /// Written only by the producer.
    write: CachePadded<AtomicU64>,
    /// Written only by the consumer.
    read: CachePadded<AtomicU64>,
}

// Safety: slot (i & mask) is accessed mutably only between the index checks
// that the write/read protocol establishes; the release/acquire pair on
// `write` publishes the slot contents before the consumer reads them.
unsafe impl<T: Send> Sync for Shared<T> {}
unsafe impl<T: Send> Send for Shared<T> {}

impl<T> Shared<T> {
    #[inline(always)]
    fn capacity(&self) -> u64 {
        self.mask + 1
    }

    #[inline(always)]
    fn slot(&self, index: u64) -> *mut MaybeUninit<T> {
        self.buf[(index & self.mask) as usize].get()
    }
}

/// Producer endpoint. Exactly one thread may own this.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    cached_read: u64,
}

/// Consumer endpoint. Exactly one thread may own this.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    cached_write: u64,
}

/// Create a ring of the given capacity and split it into its endpoints.
///
/// `capacity` must be a non-zero power of two.
pub fn ring<T: Copy>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "ring capacity must be non-zero");
    assert!(
        capacity.is_power_of_two(),
        "ring capacity must be a power of two, got {capacity}"
    );

    let buf: Box<[UnsafeCell<MaybeUninit<T>>]> = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect();

    let shared = Arc::new(Shared {
        buf,
        mask: capacity as u64 - 1,
        write: CachePadded::new(AtomicU64::new(0)),
        read: CachePadded::new(AtomicU64::new(0)),
    });

    (
        Producer {
            shared: Arc::clone(&shared),
            cached_read: 0,
        },
        Consumer {
            shared,
            cached_write: 0,
        },
    )
}

impl<T: Copy> Producer<T> {
    /// Push one element. Returns `false` iff the ring is full even after
    /// refreshing the cached read index.
    #[inline(always)]
    pub fn try_push(&mut self, value: T) -> bool {
        let shared = &*self.shared;
        let write = shared.write.load(Ordering::Relaxed);

        if write.wrapping_sub(self.cached_read) >= shared.capacity() {
            self.cached_read = shared.read.load(Ordering::Acquire);
            if write.wrapping_sub(self.cached_read) >= shared.capacity() {
                return false;
            }
        }

        unsafe {
            (*shared.slot(write)).write(value);
        }
        shared.write.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Approximate occupancy; advisory only.
    #[inline]
    pub fn len(&self) -> usize {
        len_of(&self.shared)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity() as usize
    }
}

impl<T: Copy> Consumer<T> {
    /// Pop one element. Returns `None` iff the ring is empty even after
    /// refreshing the cached write index.
    #[inline(always)]
    pub fn try_pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let read = shared.read.load(Ordering::Relaxed);

        if read == self.cached_write {
            self.cached_write = shared.write.load(Ordering::Acquire);
            if read == self.cached_write {
                return None;
            }
        }

        let value = unsafe { (*shared.slot(read)).assume_init() };
        shared.read.store(read.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Approximate occupancy; advisory only.
    #[inline]
    pub fn len(&self) -> usize {
        len_of(&self.shared)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity() as usize
    }
}

#[inline]
fn len_of<T>(shared: &Shared<T>) -> usize {
    let write = shared.write.load(Ordering::Acquire);
    let read = shared.read.load(Ordering::Acquire);
    write.wrapping_sub(read) as usize
}
