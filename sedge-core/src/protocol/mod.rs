//! Wire protocol: fixed-layout binary packets
//!
//! Every datagram starts with a 12-byte header followed by a kind-specific
//! payload. All integers are little-endian; prices are fixed-point with a
//! scale of 10,000.
//!
//! ```text
//! header:  [kind u8][version u8][payload_size u16][sequence u64]
//! trade:   [source_ts u64][seq_echo u64][symbol u32][trade_id u32]
//!          [price u64][quantity u32][side u8][pad u8;3]            = 40 B
//! quote:   [source_ts u64][seq_echo u64][symbol u32][bid u64][ask u64]
//!          [bid_size u32][ask_size u32][depth u8][pad u8;7]        = 52 B
//! ```
//!
//! The `seq_echo` field duplicates the header sequence; the header value is
//! authoritative and the echo is never consulted. Decoding reads fields
//! individually rather than casting the buffer, so short or misaligned input
//! can never fault.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::core::{MessageKind, QuoteEvent, Side, TradeEvent};

/// Packet header size on the wire.
pub const HEADER_BYTES: usize = 12;
/// Largest payload the protocol admits.
pub const MAX_PAYLOAD_BYTES: usize = 256;
/// Trade payload size on the wire.
pub const TRADE_PAYLOAD_BYTES: usize = 40;
/// Quote payload size on the wire.
pub const QUOTE_PAYLOAD_BYTES: usize = 52;
/// Protocol version this decoder understands.
pub const WIRE_VERSION: u8 = 1;
/// Fixed-point price scale: 4 implied decimal places.
pub const PRICE_SCALE: u64 = 10_000;

/// Decode failures for a single datagram
///
/// Every variant is a drop-with-counter condition for the ingest loop; none
/// of them is fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("short packet: need {need} bytes, have {have}")]
    ShortPacket { need: usize, have: usize },

    #[error("unknown message kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("truncated payload: declared {declared} bytes, have {have}")]
    TruncatedPayload { declared: usize, have: usize },

    #[error("declared payload of {0} bytes exceeds the protocol maximum")]
    OversizedPayload(usize),

    #[error("invalid trade side: {0:#04x}")]
    InvalidSide(u8),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Parsed packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: MessageKind,
    pub version: u8,
    pub payload_size: u16,
    pub sequence: u64,
}

/// Kind-specific packet body
///
/// Order-book messages are sequenced but carry no normalized payload in this
/// pipeline, so they decode to `Other`; heartbeats likewise carry nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketBody {
    Trade(TradeBody),
    Quote(QuoteBody),
    Heartbeat,
    Other,
}

/// Trade payload fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeBody {
    pub source_ts_ns: u64,
    pub sequence_echo: u64,
    pub symbol_id: u32,
    pub trade_id: u32,
    pub price: u64,
    pub quantity: u32,
    pub side: Side,
}

/// Quote payload fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteBody {
    pub source_ts_ns: u64,
    pub sequence_echo: u64,
    pub symbol_id: u32,
    pub bid_price: u64,
    pub ask_price: u64,
    pub bid_size: u32,
    pub ask_size: u32,
    pub depth: u8,
}

/// Fully decoded datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketView {
    pub header: PacketHeader,
    pub body: PacketBody,
}

impl TradeBody {
    #[inline]
    pub fn to_event(&self) -> TradeEvent {
        TradeEvent {
            price: self.price,
            quantity: self.quantity,
            trade_id: self.trade_id,
            side: self.side,
        }
    }
}

impl QuoteBody {
    #[inline]
    pub fn to_event(&self) -> QuoteEvent {
        QuoteEvent {
            bid_price: self.bid_price,
            ask_price: self.ask_price,
            bid_size: self.bid_size,
            ask_size: self.ask_size,
            depth: self.depth,
        }
    }
}

/// Decode one datagram.
///
/// Payload bytes beyond `payload_size` are ignored; a declared payload that
/// exceeds the buffer is a truncation error.
pub fn decode(buf: &[u8]) -> DecodeResult<PacketView> {
    if buf.len() < HEADER_BYTES {
        return Err(DecodeError::ShortPacket {
            need: HEADER_BYTES,
            have: buf.len(),
        });
    }

    let kind_raw = buf[0];
    let kind = MessageKind::from_u8(kind_raw).ok_or(DecodeError::UnknownKind(kind_raw))?;
    let version = buf[1];
    let payload_size = LittleEndian::read_u16(&buf[2..4]);
    let sequence = LittleEndian::read_u64(&buf[4..12]);

    let header = PacketHeader {
        kind,
        version,
        payload_size,
        sequence,
    };

    let declared = payload_size as usize;
    if declared > MAX_PAYLOAD_BYTES {
        return Err(DecodeError::OversizedPayload(declared));
    }

    let payload = &buf[HEADER_BYTES..];
    if payload.len() < declared {
        return Err(DecodeError::TruncatedPayload {
            declared,
            have: payload.len(),
        });
    }

    let body = match kind {
        MessageKind::Trade => {
            let p = checked_payload(payload, declared, TRADE_PAYLOAD_BYTES)?;
            PacketBody::Trade(decode_trade(p)?)
        }
        MessageKind::Quote => {
            let p = checked_payload(payload, declared, QUOTE_PAYLOAD_BYTES)?;
            PacketBody::Quote(decode_quote(p))
        }
        MessageKind::Heartbeat => PacketBody::Heartbeat,
        MessageKind::OrderAdd | MessageKind::OrderDelete | MessageKind::OrderModify => {
            PacketBody::Other
        }
    };

    Ok(PacketView { header, body })
}

#[inline]
fn checked_payload(payload: &[u8], declared: usize, need: usize) -> DecodeResult<&[u8]> {
    if declared < need || payload.len() < need {
        return Err(DecodeError::TruncatedPayload {
            declared,
            have: payload.len(),
        });
    }
    Ok(&payload[..need])
}

fn decode_trade(p: &[u8]) -> DecodeResult<TradeBody> {
    let side_raw = p[36];
    let side = Side::from_wire(side_raw).ok_or(DecodeError::InvalidSide(side_raw))?;
    Ok(TradeBody {
        source_ts_ns: LittleEndian::read_u64(&p[0..8]),
        sequence_echo: LittleEndian::read_u64(&p[8..16]),
        symbol_id: LittleEndian::read_u32(&p[16..20]),
        trade_id: LittleEndian::read_u32(&p[20..24]),
        price: LittleEndian::read_u64(&p[24..32]),
        quantity: LittleEndian::read_u32(&p[32..36]),
        side,
    })
}

fn decode_quote(p: &[u8]) -> QuoteBody {
    QuoteBody {
        source_ts_ns: LittleEndian::read_u64(&p[0..8]),
        sequence_echo: LittleEndian::read_u64(&p[8..16]),
        symbol_id: LittleEndian::read_u32(&p[16..20]),
        bid_price: LittleEndian::read_u64(&p[20..28]),
        ask_price: LittleEndian::read_u64(&p[28..36]),
        bid_size: LittleEndian::read_u32(&p[36..40]),
        ask_size: LittleEndian::read_u32(&p[40..44]),
        depth: p[44],
    }
}

/// Encode a trade packet (generator and test use).
pub fn encode_trade(seq: u64, body: &TradeBody) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_BYTES + TRADE_PAYLOAD_BYTES];
    write_header(&mut buf, MessageKind::Trade, TRADE_PAYLOAD_BYTES as u16, seq);
    let p = &mut buf[HEADER_BYTES..];
    LittleEndian::write_u64(&mut p[0..8], body.source_ts_ns);
    LittleEndian::write_u64(&mut p[8..16], body.sequence_echo);
    LittleEndian::write_u32(&mut p[16..20], body.symbol_id);
    LittleEndian::write_u32(&mut p[20..24], body.trade_id);
    LittleEndian::write_u64(&mut p[24..32], body.price);
    LittleEndian::write_u32(&mut p[32..36], body.quantity);
    p[36] = body.side.to_wire();
    buf
}

/// Encode a quote packet (generator and test use).
pub fn encode_quote(seq: u64, body: &QuoteBody) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_BYTES + QUOTE_PAYLOAD_BYTES];
    write_header(&mut buf, MessageKind::Quote, QUOTE_PAYLOAD_BYTES as u16, seq);
    let p = &mut buf[HEADER_BYTES..];
    LittleEndian::write_u64(&mut p[0..8], body.source_ts_ns);
    LittleEndian::write_u64(&mut p[8..16], body.sequence_echo);
    LittleEndian::write_u32(&mut p[16..20], body.symbol_id);
    LittleEndian::write_u64(&mut p[20..28], body.bid_price);
    LittleEndian::write_u64(&mut p[28..36], body.ask_price);
    LittleEndian::write_u32(&mut p[36..40], body.bid_size);
    LittleEndian::write_u32(&mut p[40..44], body.ask_size);
    p[44] = body.depth;
    buf
}

/// Encode a heartbeat packet.
pub fn encode_heartbeat(seq: u64) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_BYTES];
    write_header(&mut buf, MessageKind::Heartbeat, 0, seq);
    buf
}

#[inline]
fn write_header(buf: &mut [u8], kind: MessageKind, payload_size: u16, seq: u64) {
    buf[0] = kind as u8;
    buf[1] = WIRE_VERSION;
    LittleEndian::write_u16(&mut buf[2..4], payload_size);
    LittleEndian::write_u64(&mut buf[4..12], seq);
}
