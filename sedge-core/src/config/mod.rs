//! Runtime configuration
//!
//! Loaded once at startup from a TOML file with `SEDGE__`-prefixed
//! environment overrides; every capacity and threshold in the pipeline is
//! fixed from this point on. Validation rejects anything the hot path
//! assumes (power-of-two ring, non-zero capacities).

use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigLoader, Environment, File};
use serde::{Deserialize, Serialize};

use crate::sequencer::SequencerConfig;

/// Top-level configuration tree
///
/// Every section (and every field) has a sensible default, so a partial
/// file or no file at all still yields a runnable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sequencer: SequencerSettings,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Multicast feed endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Multicast group to join (or a unicast bind for bench/test feeds)
    #[serde(default = "default_multicast_addr")]
    pub multicast_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local interface for the multicast join
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Kernel receive buffer request (SO_RCVBUF)
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_bytes: usize,
}

/// Fixed pipeline capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// SPSC ring capacity; must be a power of two
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    /// Slab pool capacity backing the reorder buffer
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
}

/// Sequencer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerSettings {
    #[serde(default = "default_max_gap")]
    pub max_gap: u64,
    #[serde(default = "default_gap_timeout_ms")]
    pub gap_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_reorder_capacity")]
    pub reorder_capacity: usize,
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window: usize,
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
}

impl SequencerSettings {
    /// Sequencer view of these settings (ns scale).
    pub fn to_sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            max_gap: self.max_gap,
            gap_timeout_ns: self.gap_timeout_ms * 1_000_000,
            max_retries: self.max_retries,
            reorder_capacity: self.reorder_capacity,
            duplicate_window: self.duplicate_window,
        }
    }

    #[inline]
    pub fn maintenance_interval_ns(&self) -> u64 {
        self.maintenance_interval_ms * 1_000_000
    }
}

/// Thread placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Core for the ingest loop
    #[serde(default)]
    pub ingest_core: Option<usize>,
    /// Core for the consumer loop
    #[serde(default)]
    pub consumer_core: Option<usize>,
    /// Request SCHED_FIFO for both loops (needs privileges)
    #[serde(default)]
    pub realtime: bool,
    #[serde(default = "default_realtime_priority")]
    pub realtime_priority: i32,
}

/// Logging and stats reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    /// Period of the stats log line emitted by the main thread
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_multicast_addr() -> String {
    "233.54.12.1".to_string()
}

fn default_port() -> u16 {
    15_000
}

fn default_interface() -> String {
    "0.0.0.0".to_string()
}

fn default_recv_buffer() -> usize {
    16 * 1024 * 1024
}

fn default_ring_capacity() -> usize {
    65_536
}

fn default_pool_capacity() -> usize {
    8_192
}

fn default_max_gap() -> u64 {
    1_000
}

fn default_gap_timeout_ms() -> u64 {
    1_000
}

fn default_max_retries() -> u8 {
    3
}

fn default_reorder_capacity() -> usize {
    1_000
}

fn default_duplicate_window() -> usize {
    10_000
}

fn default_maintenance_interval_ms() -> u64 {
    100
}

fn default_realtime_priority() -> i32 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval() -> u64 {
    1
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            multicast_addr: default_multicast_addr(),
            port: default_port(),
            interface: default_interface(),
            recv_buffer_bytes: default_recv_buffer(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
            pool_capacity: default_pool_capacity(),
        }
    }
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            max_gap: default_max_gap(),
            gap_timeout_ms: default_gap_timeout_ms(),
            max_retries: default_max_retries(),
            reorder_capacity: default_reorder_capacity(),
            duplicate_window: default_duplicate_window(),
            maintenance_interval_ms: default_maintenance_interval_ms(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ingest_core: None,
            consumer_core: None,
            realtime: false,
            realtime_priority: default_realtime_priority(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            pipeline: PipelineConfig::default(),
            sequencer: SequencerSettings::default(),
            runtime: RuntimeConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file with environment overrides (`SEDGE__` prefix).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let loader = ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("SEDGE").separator("__"))
            .build()
            .context("failed to build configuration")?;

        let cfg: Config = loader
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Parsed multicast group address.
    pub fn multicast_group(&self) -> Result<Ipv4Addr> {
        self.transport
            .multicast_addr
            .parse()
            .with_context(|| format!("invalid multicast address '{}'", self.transport.multicast_addr))
    }

    /// Parsed local interface address.
    pub fn interface_addr(&self) -> Result<Ipv4Addr> {
        self.transport
            .interface
            .parse()
            .with_context(|| format!("invalid interface address '{}'", self.transport.interface))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.ring_capacity == 0 || !self.pipeline.ring_capacity.is_power_of_two() {
            anyhow::bail!(
                "ring_capacity must be a non-zero power of two, got {}",
                self.pipeline.ring_capacity
            );
        }

        if self.pipeline.pool_capacity == 0 {
            anyhow::bail!("pool_capacity must be non-zero");
        }

        if self.sequencer.reorder_capacity == 0 {
            anyhow::bail!("reorder_capacity must be non-zero");
        }

        if self.sequencer.duplicate_window == 0 {
            anyhow::bail!("duplicate_window must be non-zero");
        }

        if self.sequencer.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }

        if self.sequencer.gap_timeout_ms == 0 {
            anyhow::bail!("gap_timeout_ms must be non-zero");
        }

        if self.sequencer.maintenance_interval_ms == 0 {
            anyhow::bail!("maintenance_interval_ms must be non-zero");
        }

        if self.pipeline.pool_capacity < self.sequencer.reorder_capacity {
            anyhow::bail!(
                "pool_capacity ({}) must cover reorder_capacity ({})",
                self.pipeline.pool_capacity,
                self.sequencer.reorder_capacity
            );
        }

        if self.transport.port == 0 {
            anyhow::bail!("port must be non-zero");
        }

        self.multicast_group()?;
        self.interface_addr()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "invalid log level '{}', must be one of: {:?}",
                self.telemetry.log_level,
                valid_log_levels
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pipeline.ring_capacity, 65_536);
        assert_eq!(cfg.sequencer.max_gap, 1_000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.pipeline.ring_capacity = 1000; // not a power of two
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.sequencer.max_retries = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.transport.multicast_addr = "not-an-ip".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.pipeline.pool_capacity = 100; // smaller than reorder buffer
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.telemetry.log_level = "verbose".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sequencer_settings_conversion() {
        let cfg = Config::default();
        let seq = cfg.sequencer.to_sequencer_config();
        assert_eq!(seq.gap_timeout_ns, 1_000_000_000);
        assert_eq!(seq.max_gap, 1_000);
        assert_eq!(cfg.sequencer.maintenance_interval_ns(), 100_000_000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[transport]
multicast_addr = "233.54.12.2"
port = 16000

[pipeline]
ring_capacity = 1024

[sequencer]
max_gap = 500

[runtime]
ingest_core = 2
consumer_core = 3

[telemetry]
log_level = "debug"
"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.transport.multicast_addr, "233.54.12.2");
        assert_eq!(cfg.transport.port, 16_000);
        assert_eq!(cfg.pipeline.ring_capacity, 1024);
        // Defaults fill whatever the file omits.
        assert_eq!(cfg.pipeline.pool_capacity, 8_192);
        assert_eq!(cfg.sequencer.max_gap, 500);
        assert_eq!(cfg.sequencer.gap_timeout_ms, 1_000);
        assert_eq!(cfg.runtime.ingest_core, Some(2));
        assert_eq!(cfg.telemetry.log_level, "debug");
    }
}
