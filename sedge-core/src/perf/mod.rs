//! Performance utilities: monotonic clock, CPU pinning, thread priority

pub mod clock;
pub mod cpu;

pub use clock::Clock;
pub use cpu::{num_cores, pin_to_core, set_realtime_priority};
