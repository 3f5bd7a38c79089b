//! Bounded reorder buffer for out-of-order packets
//!
//! Holds future-dated packets (keyed by sequence) until their predecessors
//! arrive. Entries are pool slots, so the raw bytes never touch the general
//! allocator. When the buffer is at capacity the lowest buffered sequence is
//! evicted to make room; a later re-arrival of the evicted sequence is
//! treated as a fresh out-of-order packet.

use std::collections::BTreeMap;

use crate::core::RawPacket;
use crate::pool::PoolGuard;

/// Outcome of [`ReorderBuffer::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Room was made by evicting this (lowest) sequence.
    Evicted(u64),
    /// The sequence was already buffered; the existing entry is kept.
    AlreadyBuffered,
}

#[derive(Debug)]
pub struct ReorderBuffer {
    entries: BTreeMap<u64, PoolGuard<RawPacket>>,
    capacity: usize,
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "reorder buffer capacity must be non-zero");
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    /// Buffer a packet under its sequence number.
    pub fn insert(&mut self, sequence: u64, packet: PoolGuard<RawPacket>) -> InsertOutcome {
        if self.entries.contains_key(&sequence) {
            return InsertOutcome::AlreadyBuffered;
        }

        let mut outcome = InsertOutcome::Inserted;
        if self.entries.len() >= self.capacity {
            if let Some((evicted_seq, _evicted)) = self.entries.pop_first() {
                outcome = InsertOutcome::Evicted(evicted_seq);
            }
        }

        self.entries.insert(sequence, packet);
        outcome
    }

    /// Remove and return the entry for exactly `sequence`, if buffered.
    #[inline]
    pub fn take(&mut self, sequence: u64) -> Option<PoolGuard<RawPacket>> {
        self.entries.remove(&sequence)
    }

    /// Lowest buffered sequence, if any.
    #[inline]
    pub fn first_sequence(&self) -> Option<u64> {
        self.entries.keys().next().copied()
    }

    #[inline]
    pub fn contains(&self, sequence: u64) -> bool {
        self.entries.contains_key(&sequence)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, returning the slots to the pool.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
