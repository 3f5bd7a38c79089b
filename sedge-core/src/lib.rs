//! Sedge Core - Tick-to-Trade Market Data Ingest Pipeline
//!
//! A reliability-and-latency layer between an exchange multicast feed and a
//! strategy thread: it reconstructs a gap-free, duplicate-free, in-order
//! event stream and hands normalized events to the consumer with
//! sub-microsecond overhead.
//!
//! ## Architecture
//!
//! ```text
//! [NIC] ──▶ [Ingest Thread]  ──▶ [SPSC Ring] ──▶ [Consumer Thread] ──▶ strategy
//!            (pinned core)                        (pinned core)
//!                │
//!                ├─ Transport        non-blocking multicast poll
//!                ├─ protocol         fixed-layout decode, length screen
//!                ├─ PacketManager    dedup / gap detect / reorder / recover
//!                │      │
//!                │      └─▶ RecoveryHandler ──▶ retransmit / snapshot feed
//!                └─ normalize        raw packet → MarketEvent
//! ```
//!
//! ## Design principles
//!
//! - **Zero allocation on the hot path**: events cross the ring by value,
//!   buffered packets live in a pre-allocated slab pool.
//! - **Cache isolation**: ring indices, pool head, and every stats counter
//!   sit on their own cache line.
//! - **Single-writer confinement**: all sequencer state belongs to the
//!   ingest thread; the only shared mutable state is the `running` flag and
//!   the relaxed stats counters.
//! - **No fatal conditions**: transport errors, malformed packets, full
//!   rings, and exhausted pools are counted and survived; only the `running`
//!   flag ends the loops.
//! - **Monomorphized seams**: `Transport`, `RecoveryHandler`, and
//!   `EventHandler` are generic parameters, not trait objects.
//!
//! ## Feed reliability model
//!
//! The sequencer follows the state model shared by the major exchange feeds
//! (incremental + retransmission + snapshot): `Initial → Live ⇄ Recovering →
//! Stale → Initial`. Gaps up to `max_gap` are buffered and re-requested with
//! a retry/timeout discipline; anything larger escalates to a snapshot
//! request and the feed drops incrementals until an external resync.

pub mod config;
pub mod consumer;
pub mod core;
pub mod ingest;
pub mod perf;
pub mod pool;
pub mod protocol;
pub mod sequencer;
pub mod spsc;
pub mod stats;
pub mod testing;

pub use crate::config::Config;
pub use crate::core::{EventPayload, MarketEvent, MessageKind, QuoteEvent, Side, TradeEvent};
pub use consumer::{EventConsumer, EventHandler};
pub use ingest::{FeedHandler, Transport, UdpTransport};
pub use sequencer::{
    Disposition, FeedState, GapFillRequest, PacketManager, RecoveryHandler, SequencerConfig,
};

/// Prelude for pipeline assembly.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::consumer::{EventConsumer, EventHandler};
    pub use crate::core::{MarketEvent, MessageKind, RawPacket};
    pub use crate::ingest::{FeedHandler, Transport, UdpTransport};
    pub use crate::perf::{pin_to_core, set_realtime_priority, Clock};
    pub use crate::pool::SlabPool;
    pub use crate::sequencer::{
        FeedState, GapFillRequest, PacketManager, RecoveryHandler, SequencerConfig,
    };
    pub use crate::spsc;
    pub use crate::stats::FeedStats;
}
