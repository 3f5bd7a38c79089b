//! Packet sequencing: dedup, gap detection, resequencing, recovery
//!
//! The sequencer turns a lossy, duplicated, reordered datagram stream into a
//! gap-free in-order stream. Feed state follows the model shared by the
//! major exchange feeds (incremental + retransmission + snapshot):
//!
//! ```text
//!            first packet
//!  Initial ──────────────▶ Live ◀──────────────┐
//!     ▲                     │                  │ last gap closes,
//!     │                     │ gap ≤ max_gap    │ buffer drained
//!     │ trigger_resync      ▼                  │
//!     │                 Recovering ────────────┘
//!     │                     │
//!     │    gap > max_gap or │ retries exhausted
//!     │                     ▼
//!     └────────────────── Stale
//! ```
//!
//! All sequencer state is confined to the ingest thread; only the counter
//! block is shared (relaxed atomics).

pub mod dedup;
pub mod manager;
pub mod reorder;

pub use dedup::DuplicateWindow;
pub use manager::PacketManager;
pub use reorder::{InsertOutcome, ReorderBuffer};

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crossbeam::utils::CachePadded;

/// Feed state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FeedState {
    /// No sequence seen yet; the next packet sets the baseline.
    Initial = 0,
    /// Normal operation; `next_expected` tracks the stream head.
    Live = 1,
    /// One or more gaps outstanding; out-of-order packets are buffered.
    Recovering = 2,
    /// Unrecoverable gap; incrementals are dropped until an external resync.
    Stale = 3,
}

impl FeedState {
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => FeedState::Live,
            2 => FeedState::Recovering,
            3 => FeedState::Stale,
            _ => FeedState::Initial,
        }
    }
}

/// Retransmission request for a missing inclusive sequence range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapFillRequest {
    pub start_seq: u64,
    pub end_seq: u64,
    /// Ingest-clock time the request was first (or last) emitted.
    pub request_time_ns: u64,
    pub retry_count: u8,
}

impl GapFillRequest {
    /// Number of missing sequences covered by the request.
    #[inline]
    pub fn span(&self) -> u64 {
        self.end_seq - self.start_seq + 1
    }
}

/// What the ingest loop should do with a packet it just sequenced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// In order: normalize and publish now.
    Deliver,
    /// Ahead of the stream: buffered, drain later.
    Buffered,
    /// Duplicate, stale, past, or unrecoverable: drop.
    Discard,
}

/// Seam to the out-of-band recovery channel
///
/// The sequencer only emits requests; the collaborator answers by feeding
/// retransmitted packets back through `process` and closing ranges with
/// `process_gap_fill`. Monomorphized into the manager, no dynamic dispatch.
pub trait RecoveryHandler {
    /// A sequence range went missing; ask the recovery feed to resend it.
    fn request_retransmit(&mut self, request: &GapFillRequest);

    /// The feed is beyond incremental repair; ask for a full snapshot.
    fn request_snapshot(&mut self);
}

/// Sequencer tuning knobs
///
/// Defaults mirror the standard feed-handler values; all of them are
/// startup-fixed.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Gaps wider than this escalate straight to `Stale`.
    pub max_gap: u64,
    /// Age after which a pending gap request is retried.
    pub gap_timeout_ns: u64,
    /// Retries per gap before the feed goes `Stale`.
    pub max_retries: u8,
    /// Reorder buffer capacity (packets).
    pub reorder_capacity: usize,
    /// Duplicate window size (distinct sequences).
    pub duplicate_window: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            max_gap: 1_000,
            gap_timeout_ns: 1_000_000_000,
            max_retries: 3,
            reorder_capacity: 1_000,
            duplicate_window: 10_000,
        }
    }
}

/// Sequencer counters, shared read-only with observers
///
/// Written by the ingest thread with relaxed ordering; any thread may read.
#[derive(Debug)]
pub struct SequencerStats {
    pub packets: CachePadded<AtomicU64>,
    pub duplicates: CachePadded<AtomicU64>,
    pub gaps_detected: CachePadded<AtomicU64>,
    pub gaps_filled: CachePadded<AtomicU64>,
    pub out_of_order: CachePadded<AtomicU64>,
    pub resequenced: CachePadded<AtomicU64>,
    pub dropped_overflow: CachePadded<AtomicU64>,
    pub gap_requests_emitted: CachePadded<AtomicU64>,
    pub next_expected: CachePadded<AtomicU64>,
    pub highest_seen: CachePadded<AtomicU64>,
    feed_state: CachePadded<AtomicU8>,
}

impl SequencerStats {
    pub fn new() -> Self {
        Self {
            packets: CachePadded::new(AtomicU64::new(0)),
            duplicates: CachePadded::new(AtomicU64::new(0)),
            gaps_detected: CachePadded::new(AtomicU64::new(0)),
            gaps_filled: CachePadded::new(AtomicU64::new(0)),
            out_of_order: CachePadded::new(AtomicU64::new(0)),
            resequenced: CachePadded::new(AtomicU64::new(0)),
            dropped_overflow: CachePadded::new(AtomicU64::new(0)),
            gap_requests_emitted: CachePadded::new(AtomicU64::new(0)),
            next_expected: CachePadded::new(AtomicU64::new(0)),
            highest_seen: CachePadded::new(AtomicU64::new(0)),
            feed_state: CachePadded::new(AtomicU8::new(FeedState::Initial as u8)),
        }
    }

    #[inline]
    pub fn feed_state(&self) -> FeedState {
        FeedState::from_u8(self.feed_state.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set_feed_state(&self, state: FeedState) {
        self.feed_state.store(state as u8, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        SequencerSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            gaps_filled: self.gaps_filled.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
            resequenced: self.resequenced.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            gap_requests_emitted: self.gap_requests_emitted.load(Ordering::Relaxed),
            next_expected: self.next_expected.load(Ordering::Relaxed),
            highest_seen: self.highest_seen.load(Ordering::Relaxed),
            feed_state: self.feed_state(),
        }
    }
}

impl Default for SequencerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time sequencer view
#[derive(Debug, Clone, Copy)]
pub struct SequencerSnapshot {
    pub packets: u64,
    pub duplicates: u64,
    pub gaps_detected: u64,
    pub gaps_filled: u64,
    pub out_of_order: u64,
    pub resequenced: u64,
    pub dropped_overflow: u64,
    pub gap_requests_emitted: u64,
    pub next_expected: u64,
    pub highest_seen: u64,
    pub feed_state: FeedState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_state_roundtrip() {
        for state in [
            FeedState::Initial,
            FeedState::Live,
            FeedState::Recovering,
            FeedState::Stale,
        ] {
            assert_eq!(FeedState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_gap_request_span() {
        let req = GapFillRequest {
            start_seq: 3,
            end_seq: 4,
            request_time_ns: 0,
            retry_count: 0,
        };
        assert_eq!(req.span(), 2);
    }

    #[test]
    fn test_stats_state_publication() {
        let stats = SequencerStats::new();
        assert_eq!(stats.feed_state(), FeedState::Initial);
        stats.set_feed_state(FeedState::Recovering);
        assert_eq!(stats.snapshot().feed_state, FeedState::Recovering);
    }
}
