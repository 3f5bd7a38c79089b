//! The packet manager: per-packet sequencing state machine
//!
//! Single-writer: every method runs on the ingest thread. The recovery
//! collaborator answers on the same thread (via `process` for retransmitted
//! packets and `process_gap_fill` for range completion), so there is no
//! concurrent mutation anywhere in here.

use tracing::{debug, info, warn};

use crate::core::RawPacket;
use crate::pool::{PoolGuard, SlabPool};
use crate::sequencer::{
    Disposition, DuplicateWindow, FeedState, GapFillRequest, InsertOutcome, RecoveryHandler,
    ReorderBuffer, SequencerConfig, SequencerStats,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub struct PacketManager<R: RecoveryHandler> {
    state: FeedState,
    next_expected: u64,
    highest_seen: u64,
    dedup: DuplicateWindow,
    reorder: ReorderBuffer,
    pending_gaps: Vec<GapFillRequest>,
    recovery: R,
    pool: SlabPool<RawPacket>,
    config: SequencerConfig,
    stats: Arc<SequencerStats>,
}

impl<R: RecoveryHandler> PacketManager<R> {
    pub fn new(config: SequencerConfig, pool: SlabPool<RawPacket>, recovery: R) -> Self {
        Self {
            state: FeedState::Initial,
            next_expected: 0,
            highest_seen: 0,
            dedup: DuplicateWindow::new(config.duplicate_window),
            reorder: ReorderBuffer::new(config.reorder_capacity),
            pending_gaps: Vec::with_capacity(16),
            recovery,
            pool,
            config,
            stats: Arc::new(SequencerStats::new()),
        }
    }

    /// Sequence one incoming packet.
    ///
    /// `bytes` is the raw datagram (buffered verbatim if the packet arrives
    /// early); `now_ns` is the arrival timestamp from the ingest clock.
    pub fn process(&mut self, sequence: u64, bytes: &[u8], now_ns: u64) -> Disposition {
        self.stats.packets.fetch_add(1, Ordering::Relaxed);

        if sequence > self.highest_seen {
            self.highest_seen = sequence;
            self.stats.highest_seen.store(sequence, Ordering::Relaxed);
        }

        if !self.dedup.observe(sequence) {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            return Disposition::Discard;
        }

        match self.state {
            FeedState::Initial => {
                self.next_expected = sequence + 1;
                self.publish_next_expected();
                self.set_state(FeedState::Live);
                Disposition::Deliver
            }
            FeedState::Live => self.on_live(sequence, bytes, now_ns),
            FeedState::Recovering => self.on_recovering(sequence, bytes, now_ns),
            FeedState::Stale => Disposition::Discard,
        }
    }

    /// Pull the next in-order packet out of the reorder buffer, if the head
    /// of the buffer is exactly `next_expected`. Called in a loop after any
    /// delivery that advanced the stream.
    pub fn pop_ready(&mut self, now_ns: u64) -> Option<PoolGuard<RawPacket>> {
        let packet = self.reorder.take(self.next_expected)?;
        self.stats.resequenced.fetch_add(1, Ordering::Relaxed);
        self.advance(now_ns);
        Some(packet)
    }

    /// Recovery channel confirmation that `[start_seq, end_seq]` has been
    /// satisfied. Idempotent: an unknown range changes nothing.
    pub fn process_gap_fill(&mut self, start_seq: u64, end_seq: u64) {
        let before = self.pending_gaps.len();
        self.pending_gaps
            .retain(|g| !(g.start_seq == start_seq && g.end_seq == end_seq));

        if self.pending_gaps.len() == before {
            return;
        }

        self.stats.gaps_filled.fetch_add(1, Ordering::Relaxed);
        debug!(start_seq, end_seq, "gap fill confirmed");
        self.promote_if_recovered();
    }

    /// Periodic timeout scan. Called by the ingest loop at least once per
    /// maintenance interval.
    pub fn maintenance(&mut self, now_ns: u64) {
        let mut exhausted = false;

        for gap in &mut self.pending_gaps {
            if now_ns.saturating_sub(gap.request_time_ns) <= self.config.gap_timeout_ns {
                continue;
            }
            if gap.retry_count < self.config.max_retries {
                gap.retry_count += 1;
                gap.request_time_ns = now_ns;
                self.recovery.request_retransmit(gap);
                self.stats.gap_requests_emitted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    start_seq = gap.start_seq,
                    end_seq = gap.end_seq,
                    retry = gap.retry_count,
                    "gap fill retry"
                );
            } else {
                exhausted = true;
            }
        }

        if exhausted {
            warn!("gap fill retries exhausted");
            self.enter_stale();
            return;
        }

        // Repair pass: a confirmed-but-never-arrived retransmission can
        // leave Recovering with no pending request and a hole in front of
        // the buffer. Re-request it so the timeout discipline applies again.
        self.check_recovery_complete(now_ns);
    }

    /// External snapshot-driven resync: drop all transient state and wait
    /// for the next packet as a fresh baseline. Idempotent.
    ///
    /// `next_expected` is left in place until the baseline packet overwrites
    /// it, so the published value never moves backwards.
    pub fn trigger_resync(&mut self) {
        info!(state = ?self.state, "resync triggered");
        self.reorder.clear();
        self.pending_gaps.clear();
        self.dedup.clear();
        self.set_state(FeedState::Initial);
    }

    #[inline]
    pub fn state(&self) -> FeedState {
        self.state
    }

    #[inline]
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    #[inline]
    pub fn pending_gaps(&self) -> &[GapFillRequest] {
        &self.pending_gaps
    }

    /// Shared counter block for observers.
    pub fn stats(&self) -> Arc<SequencerStats> {
        Arc::clone(&self.stats)
    }

    /// The recovery collaborator (e.g. to inspect or drive it in tests).
    pub fn recovery(&self) -> &R {
        &self.recovery
    }

    pub fn recovery_mut(&mut self) -> &mut R {
        &mut self.recovery
    }

    fn on_live(&mut self, sequence: u64, bytes: &[u8], now_ns: u64) -> Disposition {
        if sequence == self.next_expected {
            self.advance(now_ns);
            return Disposition::Deliver;
        }

        if sequence < self.next_expected {
            // Already past this point in the stream; the duplicate window
            // normally catches these, this is the backstop.
            return Disposition::Discard;
        }

        let gap_size = sequence - self.next_expected;
        self.stats.gaps_detected.fetch_add(1, Ordering::Relaxed);

        if gap_size > self.config.max_gap {
            warn!(
                sequence,
                next_expected = self.next_expected,
                gap_size,
                max_gap = self.config.max_gap,
                "gap exceeds recovery limit"
            );
            self.enter_stale();
            return Disposition::Discard;
        }

        self.register_gap(self.next_expected, sequence - 1, now_ns);
        self.buffer_packet(sequence, bytes);
        self.set_state(FeedState::Recovering);
        Disposition::Buffered
    }

    fn on_recovering(&mut self, sequence: u64, bytes: &[u8], now_ns: u64) -> Disposition {
        if sequence == self.next_expected {
            self.advance(now_ns);
            return Disposition::Deliver;
        }

        if sequence > self.next_expected {
            self.buffer_packet(sequence, bytes);
            return Disposition::Buffered;
        }

        // Behind the stream head: only meaningful as a late retransmission
        // for a range we still track.
        if let Some(pos) = self
            .pending_gaps
            .iter()
            .position(|g| g.start_seq <= sequence && sequence <= g.end_seq)
        {
            if sequence == self.pending_gaps[pos].end_seq {
                let closed = self.pending_gaps.remove(pos);
                self.stats.gaps_filled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    start_seq = closed.start_seq,
                    end_seq = closed.end_seq,
                    "gap closed by retransmission"
                );
                self.check_recovery_complete(now_ns);
            }
            return Disposition::Deliver;
        }

        Disposition::Discard
    }

    /// The stream head moved: bump `next_expected`, retire any request fully
    /// behind it, and re-evaluate the recovery state.
    fn advance(&mut self, now_ns: u64) {
        self.next_expected += 1;
        self.publish_next_expected();

        let next_expected = self.next_expected;
        let before = self.pending_gaps.len();
        self.pending_gaps.retain(|g| g.end_seq >= next_expected);
        let retired = before - self.pending_gaps.len();
        if retired > 0 {
            self.stats
                .gaps_filled
                .fetch_add(retired as u64, Ordering::Relaxed);
        }

        self.check_recovery_complete(now_ns);
    }

    /// Recovering ends only when no request is pending *and* no buffered
    /// packet is still waiting on a hole. A retired request with buffered
    /// successors means the gap widened while we were recovering; request
    /// the remaining hole instead of going Live with a wedged buffer.
    fn check_recovery_complete(&mut self, now_ns: u64) {
        if self.state != FeedState::Recovering || !self.pending_gaps.is_empty() {
            return;
        }

        match self.reorder.first_sequence() {
            None => self.set_state(FeedState::Live),
            Some(first) if first == self.next_expected => {
                // Head of the buffer is next in line; the drain loop
                // promotes once it empties.
            }
            Some(first) => {
                self.stats.gaps_detected.fetch_add(1, Ordering::Relaxed);
                self.register_gap(self.next_expected, first - 1, now_ns);
            }
        }
    }

    /// Passive promotion: used by `process_gap_fill`, where retransmitted
    /// packets may still be in flight, so a remaining hole is not re-requested
    /// here (the advance path and maintenance repair cover it).
    fn promote_if_recovered(&mut self) {
        if self.state == FeedState::Recovering
            && self.pending_gaps.is_empty()
            && self.reorder.is_empty()
        {
            self.set_state(FeedState::Live);
        }
    }

    fn register_gap(&mut self, start_seq: u64, end_seq: u64, now_ns: u64) {
        let request = GapFillRequest {
            start_seq,
            end_seq,
            request_time_ns: now_ns,
            retry_count: 0,
        };
        self.pending_gaps.push(request);
        self.recovery.request_retransmit(&request);
        self.stats.gap_requests_emitted.fetch_add(1, Ordering::Relaxed);
        debug!(start_seq, end_seq, span = request.span(), "gap fill requested");
    }

    fn buffer_packet(&mut self, sequence: u64, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        // Pool exhaustion is counted by the pool itself; the packet is lost
        // and the gap-timeout path picks it up.
        let Some(guard) = self.pool.try_insert(RawPacket::copy_from(bytes)) else {
            debug!(sequence, "reorder pool exhausted, packet dropped");
            return;
        };

        self.stats.out_of_order.fetch_add(1, Ordering::Relaxed);
        match self.reorder.insert(sequence, guard) {
            InsertOutcome::Inserted | InsertOutcome::AlreadyBuffered => {}
            InsertOutcome::Evicted(evicted) => {
                self.stats.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                debug!(evicted, "reorder buffer full, lowest sequence evicted");
            }
        }
    }

    fn enter_stale(&mut self) {
        if self.state == FeedState::Stale {
            return;
        }
        self.set_state(FeedState::Stale);
        self.recovery.request_snapshot();
    }

    fn set_state(&mut self, state: FeedState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, "feed state transition");
            self.state = state;
            self.stats.set_feed_state(state);
        }
    }

    #[inline]
    fn publish_next_expected(&self) {
        self.stats
            .next_expected
            .store(self.next_expected, Ordering::Relaxed);
    }
}
