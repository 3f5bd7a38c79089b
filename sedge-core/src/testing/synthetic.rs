//! Synthetic market data feed with anomaly injection
//!
//! Emits a sequenced trade stream with configurable probabilities of gaps,
//! duplicates, and reordering, to exercise every path of the sequencing
//! state machine. Deterministic when seeded, which is what the integration
//! tests rely on.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::Side;
use crate::protocol::{self, TradeBody};

/// Generator tuning; probabilities are per-packet.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub symbol_id: u32,
    pub gap_probability: f64,
    pub duplicate_probability: f64,
    pub reorder_probability: f64,
    /// Gaps skip 1..=max_gap_span sequences.
    pub max_gap_span: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            symbol_id: 12_345,
            gap_probability: 0.001,
            duplicate_probability: 0.002,
            reorder_probability: 0.005,
            max_gap_span: 10,
        }
    }
}

/// Running totals of injected anomalies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticStats {
    pub packets: u64,
    pub gaps_injected: u64,
    pub duplicates_injected: u64,
    pub reordered: u64,
}

pub struct SyntheticFeed {
    config: SyntheticConfig,
    rng: StdRng,
    sequence: u64,
    last_frame: Option<Vec<u8>>,
    held: Option<Vec<u8>>,
    stats: SyntheticStats,
}

impl SyntheticFeed {
    pub fn new(seed: u64, config: SyntheticConfig) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            sequence: 1,
            last_frame: None,
            held: None,
            stats: SyntheticStats::default(),
        }
    }

    /// Produce the next burst of frames (possibly empty while a packet is
    /// held back for reordering, possibly two when it is released).
    pub fn next_frames(&mut self) -> Vec<Vec<u8>> {
        let roll: f64 = self.rng.gen();
        let gap_p = self.config.gap_probability;
        let dup_p = self.config.duplicate_probability;
        let reorder_p = self.config.reorder_probability;

        // Gap: silently skip a run of sequences.
        if roll < gap_p {
            let span = 1 + self.rng.gen_range(0..self.config.max_gap_span);
            self.sequence += span;
            self.stats.gaps_injected += 1;
        }

        // Duplicate: resend the previous frame verbatim alongside the next.
        let duplicate = if roll >= gap_p && roll < gap_p + dup_p {
            self.last_frame.clone()
        } else {
            None
        };
        if duplicate.is_some() {
            self.stats.duplicates_injected += 1;
        }

        let frame = self.build_frame();
        self.last_frame = Some(frame.clone());
        self.stats.packets += 1;

        let mut out = Vec::with_capacity(3);
        if let Some(dup) = duplicate {
            out.push(dup);
        }

        // Reorder: hold this frame and emit it after its successor.
        if roll >= gap_p + dup_p && roll < gap_p + dup_p + reorder_p {
            if let Some(held) = self.held.take() {
                out.push(frame);
                out.push(held);
                self.stats.reordered += 1;
            } else {
                self.held = Some(frame);
            }
        } else {
            out.push(frame);
            if let Some(held) = self.held.take() {
                out.push(held);
                self.stats.reordered += 1;
            }
        }

        out
    }

    /// Release a held frame at end of stream.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        self.held.take()
    }

    pub fn stats(&self) -> SyntheticStats {
        self.stats
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn build_frame(&mut self) -> Vec<u8> {
        let seq = self.sequence;
        self.sequence += 1;

        let price = 1_500_000 + self.rng.gen_range(0..10_000);
        let quantity = 100 + self.rng.gen_range(0..1_000);
        let side = if self.rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        };

        protocol::encode_trade(
            seq,
            &TradeBody {
                source_ts_ns: seq * 1_000,
                sequence_echo: seq,
                symbol_id: self.config.symbol_id,
                trade_id: seq as u32,
                price,
                quantity,
                side,
            },
        )
    }
}
