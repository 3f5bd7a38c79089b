//! Test doubles and synthetic feed tooling
//!
//! Shared by the unit tests, the integration suites, and the
//! `feed-generator` binary. Nothing here runs on the production hot path.

pub mod synthetic;

pub use synthetic::SyntheticFeed;

use std::collections::VecDeque;
use std::io;

use crate::core::{MarketEvent, Side};
use crate::consumer::EventHandler;
use crate::ingest::Transport;
use crate::protocol::{self, QuoteBody, TradeBody};
use crate::sequencer::{GapFillRequest, RecoveryHandler};

/// Build a trade datagram with plausible filler fields.
pub fn trade_frame(seq: u64, symbol_id: u32, price: u64, quantity: u32) -> Vec<u8> {
    protocol::encode_trade(
        seq,
        &TradeBody {
            source_ts_ns: seq * 1_000,
            sequence_echo: seq,
            symbol_id,
            trade_id: seq as u32,
            price,
            quantity,
            side: if seq % 2 == 0 { Side::Sell } else { Side::Buy },
        },
    )
}

/// Build a quote datagram.
pub fn quote_frame(seq: u64, symbol_id: u32, bid_price: u64, ask_price: u64) -> Vec<u8> {
    protocol::encode_quote(
        seq,
        &QuoteBody {
            source_ts_ns: seq * 1_000,
            sequence_echo: seq,
            symbol_id,
            bid_price,
            ask_price,
            bid_size: 100,
            ask_size: 100,
            depth: 1,
        },
    )
}

/// Build a heartbeat datagram.
pub fn heartbeat_frame(seq: u64) -> Vec<u8> {
    protocol::encode_heartbeat(seq)
}

/// Transport fed from a queue of pre-built frames.
#[derive(Default)]
pub struct ScriptedTransport {
    frames: VecDeque<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames<I: IntoIterator<Item = Vec<u8>>>(frames: I) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn push_frame(&mut self, frame: Vec<u8>) {
        self.frames.push_back(frame);
    }

    pub fn is_drained(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Transport for ScriptedTransport {
    fn poll(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.frames.pop_front() {
            Some(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(Some(n))
            }
            None => Ok(None),
        }
    }
}

/// Recovery handler that ignores every request.
pub struct NullRecovery;

impl RecoveryHandler for NullRecovery {
    fn request_retransmit(&mut self, _request: &GapFillRequest) {}
    fn request_snapshot(&mut self) {}
}

/// Recovery handler that records every request for assertions.
#[derive(Default)]
pub struct RecordingRecovery {
    pub retransmits: Vec<(u64, u64)>,
    pub snapshots: usize,
}

impl RecoveryHandler for RecordingRecovery {
    fn request_retransmit(&mut self, request: &GapFillRequest) {
        self.retransmits.push((request.start_seq, request.end_seq));
    }

    fn request_snapshot(&mut self) {
        self.snapshots += 1;
    }
}

/// Event handler that stores every delivered event.
#[derive(Default)]
pub struct CapturingHandler {
    pub events: Vec<MarketEvent>,
}

impl EventHandler for CapturingHandler {
    fn on_event(&mut self, event: &MarketEvent) {
        self.events.push(*event);
    }
}
