//! CPU affinity and thread priority
//!
//! Both loops busy-poll; pinning them to isolated cores and raising their
//! scheduling class keeps latency jitter down. Both operations are
//! best-effort and report failure instead of panicking.

use anyhow::Result;
use core_affinity::CoreId;

/// Pin the current thread to a specific CPU core.
pub fn pin_to_core(core: usize) -> Result<()> {
    let core_id = CoreId { id: core };

    if core_affinity::set_for_current(core_id) {
        tracing::info!("pinned thread to CPU core {}", core);
        Ok(())
    } else {
        anyhow::bail!("failed to pin thread to core {}", core)
    }
}

/// Set SCHED_FIFO real-time priority for the current thread (Linux only).
///
/// Requires CAP_SYS_NICE or root.
#[cfg(target_os = "linux")]
pub fn set_realtime_priority(priority: i32) -> Result<()> {
    use libc::{sched_param, sched_setscheduler, SCHED_FIFO};

    unsafe {
        let param = sched_param {
            sched_priority: priority,
        };

        if sched_setscheduler(0, SCHED_FIFO, &param) == 0 {
            tracing::info!("set thread priority to SCHED_FIFO:{}", priority);
            Ok(())
        } else {
            anyhow::bail!("failed to set realtime priority (need CAP_SYS_NICE or root)")
        }
    }
}

/// No-op on platforms without SCHED_FIFO.
#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority(_priority: i32) -> Result<()> {
    tracing::warn!("realtime priority not supported on this platform");
    Ok(())
}

/// Number of CPU cores visible to the process.
pub fn num_cores() -> usize {
    core_affinity::get_core_ids()
        .map(|ids| ids.len())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_cores() {
        assert!(num_cores() > 0);
    }

    #[test]
    fn test_pin_to_core_does_not_panic() {
        // Pinning may be refused (containers, macOS); only the error path
        // matters here.
        let _ = pin_to_core(0);
    }
}
