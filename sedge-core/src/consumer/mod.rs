//! Consumer loop: ring → latency accounting → strategy callback
//!
//! Pinned to its own core, busy-polls the ring, and hands each event to the
//! strategy handler in sequence order. End-to-end latency is measured here:
//! `now − event.recv_ts_ns` on the shared clock, folded into the feed stats.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::core::MarketEvent;
use crate::perf::Clock;
use crate::spsc::Consumer;
use crate::stats::FeedStats;

/// Strategy seam. Implementations must be fast and non-blocking; the loop
/// calls this inline on the consumer core.
pub trait EventHandler {
    fn on_event(&mut self, event: &MarketEvent);
}

impl<F: FnMut(&MarketEvent)> EventHandler for F {
    #[inline(always)]
    fn on_event(&mut self, event: &MarketEvent) {
        self(event)
    }
}

/// The consumer half of the pipeline.
pub struct EventConsumer<H: EventHandler> {
    ring: Consumer<MarketEvent>,
    handler: H,
    clock: Clock,
    stats: Arc<FeedStats>,
}

impl<H: EventHandler> EventConsumer<H> {
    pub fn new(ring: Consumer<MarketEvent>, handler: H, clock: Clock, stats: Arc<FeedStats>) -> Self {
        Self {
            ring,
            handler,
            clock,
            stats,
        }
    }

    /// Busy-poll until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) {
        info!("consumer loop started");
        while running.load(Ordering::Acquire) {
            if !self.poll_once() {
                std::hint::spin_loop();
            }
        }
        info!("consumer loop stopped");
    }

    /// Process at most one event. Returns `false` when the ring was empty.
    #[inline]
    pub fn poll_once(&mut self) -> bool {
        let Some(event) = self.ring.try_pop() else {
            return false;
        };

        let now = self.clock.now_ns();
        self.stats
            .latency
            .record(now.saturating_sub(event.recv_ts_ns));
        self.stats.events_consumed.fetch_add(1, Ordering::Relaxed);
        self.handler.on_event(&event);
        true
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventPayload, MessageKind, Side, TradeEvent};
    use crate::spsc;

    fn event(sequence: u64, recv_ts_ns: u64) -> MarketEvent {
        MarketEvent {
            recv_ts_ns,
            source_ts_ns: 0,
            sequence,
            symbol_id: 1,
            kind: MessageKind::Trade,
            payload: EventPayload::Trade(TradeEvent {
                price: 1,
                quantity: 1,
                trade_id: 1,
                side: Side::Buy,
            }),
        }
    }

    #[test]
    fn test_events_dispatched_in_order() {
        let (mut tx, rx) = spsc::ring(8);
        let stats = Arc::new(FeedStats::new());
        let mut seen = Vec::new();
        {
            let mut consumer = EventConsumer::new(
                rx,
                |ev: &MarketEvent| seen.push(ev.sequence),
                Clock::new(),
                Arc::clone(&stats),
            );

            for seq in 1..=3 {
                assert!(tx.try_push(event(seq, 0)));
            }
            while consumer.poll_once() {}
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(stats.snapshot().events_consumed, 3);
    }

    #[test]
    fn test_latency_recorded_per_event() {
        let (mut tx, rx) = spsc::ring(8);
        let stats = Arc::new(FeedStats::new());
        let clock = Clock::new();
        let mut consumer =
            EventConsumer::new(rx, |_: &MarketEvent| {}, clock, Arc::clone(&stats));

        // recv_ts in the past relative to the consumer's clock read.
        tx.try_push(event(1, 0));
        assert!(consumer.poll_once());

        let snap = stats.snapshot();
        assert_eq!(snap.latency.count, 1);
        assert!(snap.latency.max_ns >= snap.latency.min_ns);
    }

    #[test]
    fn test_poll_once_on_empty_ring() {
        let (_tx, rx) = spsc::ring::<MarketEvent>(8);
        let stats = Arc::new(FeedStats::new());
        let mut consumer =
            EventConsumer::new(rx, |_: &MarketEvent| {}, Clock::new(), stats);
        assert!(!consumer.poll_once());
    }
}
