//! feed-ingest: the live tick-to-trade pipeline
//!
//! Joins the configured multicast group, runs the ingest loop and the
//! consumer loop on their pinned cores, and reports stats periodically
//! until SIGINT/SIGTERM clears the running flag.
//!
//! The consumer installs a minimal spread-watching handler in place of a
//! real strategy: it tracks top-of-book and logs occasionally, which is
//! enough to observe tick-to-strategy latency end to end.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{debug, info, warn};

use sedge_bins::common;
use sedge_core::consumer::{EventConsumer, EventHandler};
use sedge_core::core::{EventPayload, MarketEvent, RawPacket};
use sedge_core::ingest::{FeedHandler, UdpTransport};
use sedge_core::perf::Clock;
use sedge_core::pool::SlabPool;
use sedge_core::sequencer::{GapFillRequest, PacketManager, RecoveryHandler};
use sedge_core::spsc;
use sedge_core::stats::FeedStats;
use sedge_core::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "sedge market data ingest pipeline")]
struct Args {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Recovery stub: logs requests where a production deployment would speak
/// the exchange retransmission / snapshot protocol.
struct LoggingRecovery;

impl RecoveryHandler for LoggingRecovery {
    fn request_retransmit(&mut self, request: &GapFillRequest) {
        warn!(
            start_seq = request.start_seq,
            end_seq = request.end_seq,
            span = request.span(),
            retry = request.retry_count,
            "gap fill requested"
        );
    }

    fn request_snapshot(&mut self) {
        warn!("snapshot requested: feed is stale until resync");
    }
}

/// Placeholder strategy: keeps top-of-book and logs a heartbeat line.
#[derive(Default)]
struct SpreadWatcher {
    last_bid: u64,
    last_ask: u64,
    events: u64,
}

impl EventHandler for SpreadWatcher {
    #[inline]
    fn on_event(&mut self, event: &MarketEvent) {
        match &event.payload {
            EventPayload::Quote(quote) => {
                self.last_bid = quote.bid_price;
                self.last_ask = quote.ask_price;
            }
            EventPayload::Trade(_) => {}
        }

        self.events += 1;
        if self.events % 100_000 == 0 {
            debug!(
                events = self.events,
                bid = self.last_bid,
                ask = self.last_ask,
                "consumer heartbeat"
            );
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.telemetry.log_level);
    common::init_logging(log_level, config.telemetry.json_logs)?;

    info!(
        group = %config.transport.multicast_addr,
        port = config.transport.port,
        ring = config.pipeline.ring_capacity,
        pool = config.pipeline.pool_capacity,
        "starting feed ingest"
    );

    // Shutdown flag, cleared by SIGINT/SIGTERM from outside the core.
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handler")?;
        thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "shutdown signal received");
                running.store(false, Ordering::Release);
            }
        });
    }

    let clock = Clock::new();
    let stats = Arc::new(FeedStats::new());
    let (producer, ring_consumer) = spsc::ring::<MarketEvent>(config.pipeline.ring_capacity);

    let pool = SlabPool::<RawPacket>::new(config.pipeline.pool_capacity);
    let manager = PacketManager::new(
        config.sequencer.to_sequencer_config(),
        pool.clone(),
        LoggingRecovery,
    );
    let sequencer_stats = manager.stats();

    let transport = UdpTransport::multicast(
        config.multicast_group()?,
        config.transport.port,
        config.interface_addr()?,
        config.transport.recv_buffer_bytes,
    )
    .context("binding multicast transport")?;

    let ingest_thread = {
        let running = Arc::clone(&running);
        let stats = Arc::clone(&stats);
        let runtime = config.runtime.clone();
        let maintenance_ns = config.sequencer.maintenance_interval_ns();
        thread::Builder::new()
            .name("sedge-ingest".into())
            .spawn(move || {
                common::setup_performance(
                    runtime.ingest_core,
                    runtime.realtime,
                    runtime.realtime_priority,
                );
                let mut handler =
                    FeedHandler::new(transport, manager, producer, clock, stats, maintenance_ns);
                handler.run(&running);
            })
            .context("spawning ingest thread")?
    };

    let consumer_thread = {
        let running = Arc::clone(&running);
        let stats = Arc::clone(&stats);
        let runtime = config.runtime.clone();
        thread::Builder::new()
            .name("sedge-consumer".into())
            .spawn(move || {
                common::setup_performance(
                    runtime.consumer_core,
                    runtime.realtime,
                    runtime.realtime_priority,
                );
                let mut consumer =
                    EventConsumer::new(ring_consumer, SpreadWatcher::default(), clock, stats);
                consumer.run(&running);
            })
            .context("spawning consumer thread")?
    };

    // Non-critical reporting stays on the main thread.
    let interval = Duration::from_secs(config.telemetry.stats_interval_secs.max(1));
    while running.load(Ordering::Acquire) {
        thread::sleep(interval);
        common::log_stats(&stats, &sequencer_stats);
    }

    ingest_thread.join().expect("ingest thread panicked");
    consumer_thread.join().expect("consumer thread panicked");

    info!("final stats");
    common::log_stats(&stats, &sequencer_stats);
    let pool_stats = pool.stats();
    info!(
        allocations = pool_stats.allocations,
        deallocations = pool_stats.deallocations,
        failures = pool_stats.failures,
        in_use = pool_stats.in_use,
        "pool stats"
    );
    info!("shutdown complete");

    Ok(())
}
