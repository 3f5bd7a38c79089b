//! feed-generator: synthetic market data feed
//!
//! Sends a sequenced trade stream over UDP at a configurable rate, with
//! gap, duplicate, and reorder injection to exercise the ingest pipeline's
//! recovery machinery against a live socket.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use sedge_bins::common;
use sedge_core::testing::synthetic::{SyntheticConfig, SyntheticFeed};

#[derive(Parser, Debug)]
#[command(author, version, about = "synthetic feed with anomaly injection")]
struct Args {
    /// Destination address (multicast group or unicast host)
    #[arg(short, long, default_value = "233.54.12.1")]
    target: Ipv4Addr,

    /// Destination port
    #[arg(short, long, default_value_t = 15_000)]
    port: u16,

    /// Packets per second
    #[arg(short = 'r', long, default_value_t = 10_000)]
    rate: u32,

    /// Total packets to send (0 = until killed)
    #[arg(short = 'n', long, default_value_t = 0)]
    count: u64,

    /// Probability of skipping a sequence run
    #[arg(long, default_value_t = 0.001)]
    gap_probability: f64,

    /// Probability of resending the previous packet
    #[arg(long, default_value_t = 0.002)]
    duplicate_probability: f64,

    /// Probability of holding a packet back one slot
    #[arg(long, default_value_t = 0.005)]
    reorder_probability: f64,

    /// RNG seed (repeatable streams)
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Symbol identifier stamped on every trade
    #[arg(long, default_value_t = 12_345)]
    symbol_id: u32,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    common::init_logging(&args.log_level, false)?;

    let socket =
        UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).context("binding sender")?;
    if args.target.is_multicast() {
        socket
            .set_multicast_ttl_v4(1)
            .context("setting multicast TTL")?;
    }
    let dest = SocketAddrV4::new(args.target, args.port);

    let mut feed = SyntheticFeed::new(
        args.seed,
        SyntheticConfig {
            symbol_id: args.symbol_id,
            gap_probability: args.gap_probability,
            duplicate_probability: args.duplicate_probability,
            reorder_probability: args.reorder_probability,
            ..SyntheticConfig::default()
        },
    );

    info!(
        %dest,
        rate = args.rate,
        count = args.count,
        gap = args.gap_probability,
        dup = args.duplicate_probability,
        reorder = args.reorder_probability,
        "starting feed generation"
    );

    let interval = Duration::from_micros(1_000_000 / args.rate.max(1) as u64);
    let start = Instant::now();
    let mut next_due = start;
    let mut sent = 0u64;

    while args.count == 0 || sent < args.count {
        if let Some(wait) = next_due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        next_due += interval;

        for frame in feed.next_frames() {
            socket.send_to(&frame, dest).context("sending frame")?;
        }
        sent += 1;

        if sent % 10_000 == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            let stats = feed.stats();
            info!(
                sent,
                rate = (sent as f64 / elapsed) as u64,
                gaps = stats.gaps_injected,
                duplicates = stats.duplicates_injected,
                reordered = stats.reordered,
                "generator progress"
            );
        }
    }

    if let Some(frame) = feed.flush() {
        socket.send_to(&frame, dest).context("sending frame")?;
    }

    let stats = feed.stats();
    info!(
        packets = stats.packets,
        gaps = stats.gaps_injected,
        duplicates = stats.duplicates_injected,
        reordered = stats.reordered,
        "generation complete"
    );

    Ok(())
}
