//! Common initialization for all binaries
//!
//! Logging, CPU placement, and the shared stats report line.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sedge_core::sequencer::SequencerStats;
use sedge_core::stats::FeedStats;

/// Initialize tracing with an env-filter override (`RUST_LOG` wins).
pub fn init_logging(level: &str, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .init();
    }

    Ok(())
}

/// Pin the current thread and optionally raise it to SCHED_FIFO.
///
/// Failures are logged, not fatal: the pipeline runs correctly unpinned,
/// just with more jitter.
pub fn setup_performance(core: Option<usize>, realtime: bool, priority: i32) {
    if let Some(core) = core {
        if let Err(e) = sedge_core::perf::pin_to_core(core) {
            tracing::warn!(error = %e, core, "CPU pinning unavailable");
        }
    }

    if realtime {
        if let Err(e) = sedge_core::perf::set_realtime_priority(priority) {
            tracing::warn!(error = %e, "realtime priority unavailable");
        }
    }
}

/// One periodic stats line covering both loops and the sequencer.
pub fn log_stats(feed: &FeedStats, sequencer: &SequencerStats) {
    let f = feed.snapshot();
    let s = sequencer.snapshot();

    tracing::info!(
        recv = f.packets_received,
        processed = f.packets_processed,
        dropped = f.packets_dropped,
        malformed = f.malformed,
        consumed = f.events_consumed,
        avg_latency_ns = f.latency.avg_ns as u64,
        min_latency_ns = f.latency.min_ns,
        max_latency_ns = f.latency.max_ns,
        "feed stats"
    );

    tracing::info!(
        state = ?s.feed_state,
        next_expected = s.next_expected,
        duplicates = s.duplicates,
        gaps_detected = s.gaps_detected,
        gaps_filled = s.gaps_filled,
        out_of_order = s.out_of_order,
        resequenced = s.resequenced,
        overflow_drops = s.dropped_overflow,
        gap_requests = s.gap_requests_emitted,
        "sequencer stats"
    );
}
