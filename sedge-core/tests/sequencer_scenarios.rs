//! End-to-end sequencing scenarios
//!
//! Drives the packet manager with real wire frames through the same
//! decode → process → normalize → drain path the ingest loop uses, and
//! checks the delivered stream plus every observable counter against the
//! feed contract:
//! - strictly increasing delivery order, no duplicates delivered
//! - gap detection, buffering, resequencing, and recovery requests
//! - Stale escalation on oversized gaps and exhausted retries
//! - idempotent gap-fill confirmation and resync

use sedge_core::core::RawPacket;
use sedge_core::ingest::normalize;
use sedge_core::pool::SlabPool;
use sedge_core::protocol;
use sedge_core::sequencer::{
    Disposition, FeedState, GapFillRequest, PacketManager, RecoveryHandler, SequencerConfig,
};
use sedge_core::testing::trade_frame;

/// Records everything the sequencer asks of the recovery channel.
#[derive(Default)]
struct Recorder {
    retransmits: Vec<(u64, u64)>,
    snapshots: usize,
}

impl RecoveryHandler for Recorder {
    fn request_retransmit(&mut self, request: &GapFillRequest) {
        self.retransmits.push((request.start_seq, request.end_seq));
    }

    fn request_snapshot(&mut self) {
        self.snapshots += 1;
    }
}

/// Minimal stand-in for the ingest loop: feeds frames through the manager
/// and collects the sequences of the events a consumer would see.
struct Harness {
    manager: PacketManager<Recorder>,
    delivered: Vec<u64>,
    now_ns: u64,
}

impl Harness {
    fn new(config: SequencerConfig) -> Self {
        let pool = SlabPool::new(2 * config.reorder_capacity.max(8));
        Self {
            manager: PacketManager::new(config, pool, Recorder::default()),
            delivered: Vec::new(),
            now_ns: 0,
        }
    }

    fn feed_seq(&mut self, seq: u64) -> Disposition {
        self.now_ns += 1_000;
        let frame = trade_frame(seq, 1, 1_000_000 + seq, 10);
        let view = protocol::decode(&frame).expect("test frame must decode");
        let disposition = self.manager.process(view.header.sequence, &frame, self.now_ns);

        if disposition == Disposition::Deliver {
            if let Some(event) = normalize(&view, self.now_ns) {
                self.delivered.push(event.sequence);
            }
        }

        while let Some(raw) = self.manager.pop_ready(self.now_ns) {
            let view = protocol::decode(raw.as_slice()).expect("buffered frame must decode");
            if let Some(event) = normalize(&view, self.now_ns) {
                self.delivered.push(event.sequence);
            }
        }

        disposition
    }

    fn feed_all(&mut self, seqs: &[u64]) {
        for &seq in seqs {
            self.feed_seq(seq);
        }
    }
}

fn harness() -> Harness {
    Harness::new(SequencerConfig::default())
}

// ============================================================================
// CONCRETE SCENARIOS
// ============================================================================

/// Scenario: perfect stream
///
/// Input 1,2,3,4,5 → output 1,2,3,4,5, no anomalies counted.
#[test]
fn test_perfect_stream() {
    let mut h = harness();
    h.feed_all(&[1, 2, 3, 4, 5]);

    assert_eq!(h.delivered, vec![1, 2, 3, 4, 5]);
    let snap = h.manager.stats().snapshot();
    assert_eq!(snap.packets, 5);
    assert_eq!(snap.duplicates, 0);
    assert_eq!(snap.gaps_detected, 0);
    assert_eq!(h.manager.state(), FeedState::Live);
}

/// Scenario: single duplicate
///
/// Input 1,2,2,3 → output 1,2,3; duplicates=1; feed stays Live.
#[test]
fn test_single_duplicate() {
    let mut h = harness();
    h.feed_all(&[1, 2, 2, 3]);

    assert_eq!(h.delivered, vec![1, 2, 3]);
    let snap = h.manager.stats().snapshot();
    assert_eq!(snap.duplicates, 1);
    assert_eq!(snap.gaps_detected, 0);
    assert_eq!(h.manager.state(), FeedState::Live);
}

/// Scenario: gap with in-order fill
///
/// Input 1,2,5,3,4,6. Upon 5 a request for (3,4) goes out and 5 is
/// buffered; 3 and 4 close the gap; the drain emits the buffered 5; 6
/// follows normally.
#[test]
fn test_gap_with_in_order_fill() {
    let mut h = harness();
    h.feed_all(&[1, 2, 5, 3, 4, 6]);

    assert_eq!(h.delivered, vec![1, 2, 3, 4, 5, 6]);
    let snap = h.manager.stats().snapshot();
    assert_eq!(snap.gaps_detected, 1);
    assert_eq!(snap.gaps_filled, 1);
    assert_eq!(snap.out_of_order, 1);
    assert_eq!(snap.resequenced, 1);
    assert_eq!(h.manager.state(), FeedState::Live);
    assert_eq!(h.manager.recovery().retransmits, vec![(3, 4)]);
}

/// Scenario: out-of-order without loss
///
/// Input 1,3,2,4 → output 1,2,3,4; the transient gap (2,2) is requested
/// and closes when 2 arrives.
#[test]
fn test_out_of_order_without_loss() {
    let mut h = harness();
    h.feed_all(&[1, 3, 2, 4]);

    assert_eq!(h.delivered, vec![1, 2, 3, 4]);
    assert_eq!(h.manager.state(), FeedState::Live);
    assert_eq!(h.manager.recovery().retransmits, vec![(2, 2)]);
}

/// Scenario: oversized gap
///
/// Input 1,2,2000 with max_gap=1000 → only 1,2 delivered; feed goes Stale
/// with a snapshot request; subsequent incrementals are dropped until an
/// external resync.
#[test]
fn test_oversized_gap_goes_stale() {
    let mut h = harness();
    h.feed_all(&[1, 2, 2000]);

    assert_eq!(h.delivered, vec![1, 2]);
    assert_eq!(h.manager.state(), FeedState::Stale);
    assert_eq!(h.manager.recovery().snapshots, 1);

    assert_eq!(h.feed_seq(3), Disposition::Discard);
    assert!(h.delivered == vec![1, 2]);

    h.manager.trigger_resync();
    assert_eq!(h.manager.state(), FeedState::Initial);

    // First packet after resync re-baselines the stream.
    assert_eq!(h.feed_seq(5000), Disposition::Deliver);
    assert_eq!(h.delivered, vec![1, 2, 5000]);
    assert_eq!(h.manager.state(), FeedState::Live);
}

/// Scenario: gap timeout
///
/// Input 1,2,5 and then silence. After max_retries timed-out maintenance
/// passes the feed goes Stale, having emitted 1 + max_retries requests.
#[test]
fn test_gap_timeout_escalates_to_stale() {
    let config = SequencerConfig::default();
    let timeout = config.gap_timeout_ns;
    let retries = config.max_retries as u64;
    let mut h = Harness::new(config);

    h.feed_all(&[1, 2, 5]);
    assert_eq!(h.manager.state(), FeedState::Recovering);

    let mut now = h.now_ns;
    for _ in 0..retries {
        now += timeout + 1;
        h.manager.maintenance(now);
        assert_eq!(h.manager.state(), FeedState::Recovering);
    }

    now += timeout + 1;
    h.manager.maintenance(now);

    assert_eq!(h.manager.state(), FeedState::Stale);
    assert_eq!(h.manager.recovery().snapshots, 1);
    assert_eq!(
        h.manager.stats().snapshot().gap_requests_emitted,
        1 + retries
    );
}

// ============================================================================
// IDEMPOTENCE
// ============================================================================

/// process_gap_fill twice: the second call changes nothing.
#[test]
fn test_process_gap_fill_idempotent() {
    let mut h = harness();
    h.feed_all(&[1, 5]);

    h.manager.process_gap_fill(2, 4);
    let first = h.manager.stats().snapshot();
    h.manager.process_gap_fill(2, 4);
    let second = h.manager.stats().snapshot();

    assert_eq!(first.gaps_filled, 1);
    assert_eq!(second.gaps_filled, 1);
    assert_eq!(h.manager.pending_gaps().len(), 0);
}

/// trigger_resync twice: the second call changes nothing.
#[test]
fn test_trigger_resync_idempotent() {
    let mut h = harness();
    h.feed_all(&[1, 2000]);
    assert_eq!(h.manager.state(), FeedState::Stale);

    h.manager.trigger_resync();
    h.manager.trigger_resync();
    assert_eq!(h.manager.state(), FeedState::Initial);
    assert!(h.manager.pending_gaps().is_empty());
}

// ============================================================================
// INVARIANTS
// ============================================================================

/// Coverage: a lossless window-sized shuffle always comes out complete and
/// ascending.
#[test]
fn test_coverage_under_lossless_reorder() {
    let mut h = harness();

    // Deterministic shuffle: deliver in stripes 1,11,21,... then 2,12,22,...
    let mut order = Vec::new();
    for offset in 0..10u64 {
        for base in 0..10u64 {
            order.push(1 + offset + base * 10);
        }
    }
    assert_eq!(order.len(), 100);
    h.feed_all(&order);

    assert_eq!(h.delivered, (1..=100).collect::<Vec<_>>());
    assert_eq!(h.manager.state(), FeedState::Live);
}

/// Ordering and no-duplicates hold under random duplication and reordering.
#[test]
fn test_ordering_invariant_under_anomalies() {
    use sedge_core::testing::synthetic::{SyntheticConfig, SyntheticFeed};

    let config = SyntheticConfig {
        gap_probability: 0.0, // lossless: everything must come out
        duplicate_probability: 0.05,
        reorder_probability: 0.10,
        ..SyntheticConfig::default()
    };
    let mut feed = SyntheticFeed::new(99, config);
    let mut h = harness();

    for _ in 0..2_000 {
        for frame in feed.next_frames() {
            let seq = protocol::decode(&frame).unwrap().header.sequence;
            h.feed_seq(seq);
        }
    }
    if let Some(frame) = feed.flush() {
        let seq = protocol::decode(&frame).unwrap().header.sequence;
        h.feed_seq(seq);
    }

    // Strictly increasing: ordering and no-duplicate in one pass.
    assert!(h.delivered.windows(2).all(|w| w[0] < w[1]));
    // Lossless input: the full prefix is delivered.
    assert_eq!(h.delivered, (1..=h.delivered.len() as u64).collect::<Vec<_>>());
    assert_eq!(h.delivered.len() as u64, feed.stats().packets);
}

/// Bounded memory: no structure exceeds its configured capacity, whatever
/// the input does.
#[test]
fn test_bounded_structures() {
    let config = SequencerConfig {
        reorder_capacity: 8,
        duplicate_window: 16,
        max_gap: 1_000,
        ..SequencerConfig::default()
    };
    let pool = SlabPool::<RawPacket>::new(16);
    let mut manager = PacketManager::new(config, pool.clone(), Recorder::default());

    // A hostile burst: one anchor, then a wall of far-future packets.
    manager.process(1, &trade_frame(1, 1, 1, 1), 0);
    for seq in 100..200u64 {
        manager.process(seq, &trade_frame(seq, 1, 1, 1), 0);
    }

    // 8-deep reorder buffer: everything else was evicted, and every evicted
    // slot went back to the pool.
    assert_eq!(pool.stats().in_use, 8);
    let snap = manager.stats().snapshot();
    assert_eq!(snap.dropped_overflow, 92);
    assert_eq!(snap.out_of_order, 100);
    assert_eq!(manager.state(), FeedState::Recovering);
}

/// Duplicate window boundary: the (N+1)th distinct sequence evicts the
/// first, whose re-arrival then counts as new.
#[test]
fn test_duplicate_window_eviction_boundary() {
    let config = SequencerConfig {
        duplicate_window: 4,
        max_gap: 1_000_000,
        reorder_capacity: 1_000,
        ..SequencerConfig::default()
    };
    let mut h = Harness::new(config);

    h.feed_seq(1); // window: {1}
    h.feed_seq(2);
    h.feed_seq(3);
    h.feed_seq(4); // window full: {1,2,3,4}
    h.feed_seq(5); // evicts 1

    // 1 is gone from the window: re-arrival counts as an arrival again
    // (the Live-state backstop still discards it as already-past).
    let before = h.manager.stats().snapshot().duplicates;
    h.feed_seq(1);
    let after = h.manager.stats().snapshot().duplicates;
    assert_eq!(before, after);

    // Whereas 5 is still tracked and counts as a duplicate.
    h.feed_seq(5);
    assert_eq!(h.manager.stats().snapshot().duplicates, after + 1);
}

/// Feed-state transitions only follow documented arcs.
#[test]
fn test_state_machine_arcs() {
    let mut h = harness();
    assert_eq!(h.manager.state(), FeedState::Initial);

    h.feed_seq(1);
    assert_eq!(h.manager.state(), FeedState::Live); // Initial → Live

    h.feed_seq(5);
    assert_eq!(h.manager.state(), FeedState::Recovering); // Live → Recovering

    h.feed_all(&[2, 3, 4]);
    assert_eq!(h.manager.state(), FeedState::Live); // Recovering → Live

    h.feed_seq(5_000);
    assert_eq!(h.manager.state(), FeedState::Stale); // Live → Stale

    h.manager.trigger_resync();
    assert_eq!(h.manager.state(), FeedState::Initial); // Stale → Initial
}
