//! Ingest loop: transport → sequencer → normalize → ring
//!
//! Runs on a pinned core and never blocks. Each iteration:
//!
//! 1. run sequencer maintenance if the interval elapsed;
//! 2. poll the transport; on empty, pause-hint and continue; on error, count
//!    and continue (never fatal);
//! 3. timestamp the datagram immediately on arrival;
//! 4. decode, screen malformed input, hand the sequence to the packet
//!    manager;
//! 5. on `Deliver`, normalize and publish; then drain any buffered packets
//!    that became ready;
//! 6. a full ring drops the event and counts it; the consumer is behind and
//!    blocking here would be worse.
//!
//! Shutdown is cooperative via the shared `running` flag.

pub mod transport;

pub use transport::{Transport, UdpTransport};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, trace, warn};

use crate::core::{EventPayload, MarketEvent, MessageKind};
use crate::perf::Clock;
use crate::protocol::{self, PacketBody, PacketView};
use crate::sequencer::{Disposition, PacketManager, RecoveryHandler};
use crate::spsc::Producer;
use crate::stats::FeedStats;

/// Receive buffer size; comfortably above the largest protocol datagram.
pub const MAX_DATAGRAM_BYTES: usize = 2048;

/// Default sequencer maintenance cadence.
pub const DEFAULT_MAINTENANCE_INTERVAL_NS: u64 = 100_000_000;

/// The producer half of the pipeline.
pub struct FeedHandler<T: Transport, R: RecoveryHandler> {
    transport: T,
    manager: PacketManager<R>,
    producer: Producer<MarketEvent>,
    clock: Clock,
    stats: Arc<FeedStats>,
    maintenance_interval_ns: u64,
}

impl<T: Transport, R: RecoveryHandler> FeedHandler<T, R> {
    pub fn new(
        transport: T,
        manager: PacketManager<R>,
        producer: Producer<MarketEvent>,
        clock: Clock,
        stats: Arc<FeedStats>,
        maintenance_interval_ns: u64,
    ) -> Self {
        Self {
            transport,
            manager,
            producer,
            clock,
            stats,
            maintenance_interval_ns,
        }
    }

    /// Busy-poll until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) {
        let mut buf = [0u8; MAX_DATAGRAM_BYTES];
        let mut last_maintenance = self.clock.now_ns();
        info!("ingest loop started");

        while running.load(Ordering::Acquire) {
            let now = self.clock.now_ns();
            if now.saturating_sub(last_maintenance) >= self.maintenance_interval_ns {
                self.manager.maintenance(now);
                last_maintenance = now;
            }

            match self.transport.poll(&mut buf) {
                Ok(Some(len)) => {
                    let arrival_ns = self.clock.now_ns();
                    self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
                    self.on_datagram(&buf[..len], arrival_ns);
                }
                Ok(None) => std::hint::spin_loop(),
                Err(e) => {
                    self.stats.recv_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "transport receive error");
                }
            }
        }

        info!("ingest loop stopped");
    }

    /// Sequencer access for the recovery return path and observers; both run
    /// on this thread.
    pub fn manager(&self) -> &PacketManager<R> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PacketManager<R> {
        &mut self.manager
    }

    fn on_datagram(&mut self, bytes: &[u8], arrival_ns: u64) {
        let view = match protocol::decode(bytes) {
            Ok(view) => view,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                trace!(error = %e, "malformed datagram dropped");
                return;
            }
        };

        let disposition = self
            .manager
            .process(view.header.sequence, bytes, arrival_ns);

        if disposition == Disposition::Deliver {
            if let Some(event) = normalize(&view, arrival_ns) {
                self.publish(event);
            }
        }

        self.drain(arrival_ns);
    }

    fn drain(&mut self, now_ns: u64) {
        while let Some(raw) = self.manager.pop_ready(now_ns) {
            // Buffered bytes already decoded once on arrival; a failure here
            // means slot corruption, which the counter makes visible.
            match protocol::decode(raw.as_slice()) {
                Ok(view) => {
                    if let Some(event) = normalize(&view, now_ns) {
                        self.publish(event);
                    }
                }
                Err(e) => {
                    self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "buffered packet failed to decode");
                }
            }
        }
    }

    #[inline]
    fn publish(&mut self, event: MarketEvent) {
        if self.producer.try_push(event) {
            self.stats.packets_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Map a decoded packet to a consumer-facing event.
///
/// Heartbeats and order-book messages are sequenced upstream but produce no
/// event.
#[inline]
pub fn normalize(view: &PacketView, recv_ts_ns: u64) -> Option<MarketEvent> {
    match view.body {
        PacketBody::Trade(trade) => Some(MarketEvent {
            recv_ts_ns,
            source_ts_ns: trade.source_ts_ns,
            sequence: view.header.sequence,
            symbol_id: trade.symbol_id,
            kind: MessageKind::Trade,
            payload: EventPayload::Trade(trade.to_event()),
        }),
        PacketBody::Quote(quote) => Some(MarketEvent {
            recv_ts_ns,
            source_ts_ns: quote.source_ts_ns,
            sequence: view.header.sequence,
            symbol_id: quote.symbol_id,
            kind: MessageKind::Quote,
            payload: EventPayload::Quote(quote.to_event()),
        }),
        PacketBody::Heartbeat | PacketBody::Other => None,
    }
}
