//! Pipeline counters and latency tracking
//!
//! Every counter is a relaxed atomic on its own cache line. Counters are
//! advisory observability surface, never a synchronization mechanism: any
//! thread may read them, the owning loop writes them.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// End-to-end latency aggregate (ns)
///
/// `record` is called by the consumer loop once per event. Min/max use
/// atomic fetch_min/fetch_max so readers on other threads see sane values.
#[derive(Debug)]
pub struct LatencyStats {
    count: CachePadded<AtomicU64>,
    total_ns: CachePadded<AtomicU64>,
    min_ns: CachePadded<AtomicU64>,
    max_ns: CachePadded<AtomicU64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            count: CachePadded::new(AtomicU64::new(0)),
            total_ns: CachePadded::new(AtomicU64::new(0)),
            min_ns: CachePadded::new(AtomicU64::new(u64::MAX)),
            max_ns: CachePadded::new(AtomicU64::new(0)),
        }
    }

    #[inline(always)]
    pub fn record(&self, latency_ns: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.min_ns.fetch_min(latency_ns, Ordering::Relaxed);
        self.max_ns.fetch_max(latency_ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ns = self.total_ns.load(Ordering::Relaxed);
        let min_ns = self.min_ns.load(Ordering::Relaxed);
        LatencySnapshot {
            count,
            min_ns: if count == 0 { 0 } else { min_ns },
            max_ns: self.max_ns.load(Ordering::Relaxed),
            avg_ns: if count == 0 {
                0.0
            } else {
                total_ns as f64 / count as f64
            },
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time latency view
#[derive(Debug, Clone, Copy)]
pub struct LatencySnapshot {
    pub count: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub avg_ns: f64,
}

/// Ingest/consumer loop counters
#[derive(Debug)]
pub struct FeedStats {
    /// Datagrams pulled off the transport
    pub packets_received: CachePadded<AtomicU64>,
    /// Events successfully published to the ring
    pub packets_processed: CachePadded<AtomicU64>,
    /// Events lost to a full ring
    pub packets_dropped: CachePadded<AtomicU64>,
    /// Datagrams rejected by the decoder (short, unknown kind, bad side)
    pub malformed: CachePadded<AtomicU64>,
    /// Transport-level receive errors (logged, never fatal)
    pub recv_errors: CachePadded<AtomicU64>,
    /// Events drained by the consumer loop
    pub events_consumed: CachePadded<AtomicU64>,
    /// Tick-to-strategy latency, recorded by the consumer
    pub latency: LatencyStats,
}

impl FeedStats {
    pub fn new() -> Self {
        Self {
            packets_received: CachePadded::new(AtomicU64::new(0)),
            packets_processed: CachePadded::new(AtomicU64::new(0)),
            packets_dropped: CachePadded::new(AtomicU64::new(0)),
            malformed: CachePadded::new(AtomicU64::new(0)),
            recv_errors: CachePadded::new(AtomicU64::new(0)),
            events_consumed: CachePadded::new(AtomicU64::new(0)),
            latency: LatencyStats::new(),
        }
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_processed: self.packets_processed.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

impl Default for FeedStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counter view
#[derive(Debug, Clone, Copy)]
pub struct FeedStatsSnapshot {
    pub packets_received: u64,
    pub packets_processed: u64,
    pub packets_dropped: u64,
    pub malformed: u64,
    pub recv_errors: u64,
    pub events_consumed: u64,
    pub latency: LatencySnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_aggregation() {
        let lat = LatencyStats::new();
        lat.record(100);
        lat.record(300);
        lat.record(200);

        let snap = lat.snapshot();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.min_ns, 100);
        assert_eq!(snap.max_ns, 300);
        assert!((snap.avg_ns - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_latency_snapshot() {
        let snap = LatencyStats::new().snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.min_ns, 0);
        assert_eq!(snap.max_ns, 0);
        assert_eq!(snap.avg_ns, 0.0);
    }

    #[test]
    fn test_feed_counters() {
        let stats = FeedStats::new();
        stats.packets_received.fetch_add(5, Ordering::Relaxed);
        stats.packets_processed.fetch_add(4, Ordering::Relaxed);
        stats.packets_dropped.fetch_add(1, Ordering::Relaxed);

        let snap = stats.snapshot();
        assert_eq!(snap.packets_received, 5);
        assert_eq!(snap.packets_processed, 4);
        assert_eq!(snap.packets_dropped, 1);
        assert_eq!(snap.malformed, 0);
    }
}
