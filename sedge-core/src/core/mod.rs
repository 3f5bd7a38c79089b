//! Zero-overhead core types shared across the pipeline
//!
//! Everything here is `Copy`, fixed-size, and free of heap pointers so that
//! events can move through the SPSC ring by value and packets can live in
//! pool slots.

pub mod types;

pub use types::{
    EventPayload, MarketEvent, MessageKind, QuoteEvent, RawPacket, Side, TradeEvent,
    MAX_PACKET_BYTES,
};
