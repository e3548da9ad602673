//! Chronos Configuration Module
//!
//! Provides configuration support via `chronos.toml`, environment variables,
//! and built-in defaults, layered with `figment`.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`CHRONOS_*`)
//! 2. Configuration file (`chronos.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Eviction policy applied by each segment once its memory budget is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionKind {
    /// Evict the least-recently-used entry.
    Lru,
    /// Evict the least-frequently-used entry.
    Lfu,
}

impl Default for EvictionKind {
    fn default() -> Self {
        Self::Lru
    }
}

/// Configuration for the segmented store (§4.2/4.3 of the design).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of segments the keyspace is partitioned into. Rounded up to
    /// the next power of two at startup.
    pub segments: usize,
    /// Total cache memory budget, in bytes, split uniformly across segments.
    pub max_memory_bytes: u64,
    /// Eviction policy applied when a segment exceeds its budget.
    pub eviction_policy: EvictionKind,
    /// Fixed per-entry bookkeeping overhead charged against the budget, in
    /// addition to key and value byte lengths.
    pub entry_overhead_bytes: u64,
    /// Maximum accepted key length, in bytes.
    pub max_key_bytes: usize,
    /// Maximum accepted value length, in bytes.
    pub max_value_bytes: usize,
    /// Interval between background expiry sweeps, in seconds.
    pub expiry_sweep_interval_s: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            segments: 256,
            max_memory_bytes: 2 * 1024 * 1024 * 1024,
            eviction_policy: EvictionKind::Lru,
            entry_overhead_bytes: 56,
            max_key_bytes: 1024,
            max_value_bytes: 10 * 1024 * 1024,
            expiry_sweep_interval_s: 60,
        }
    }
}

/// Configuration for the predictive prefetcher (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Whether the prefetcher observes accesses and issues predictions.
    pub enabled: bool,
    /// Minimum transition confidence required to issue a prefetch.
    pub confidence: f64,
    /// Number of most-recent accesses per key kept for transition tracking.
    pub window: usize,
    /// Maximum number of candidate keys considered per prediction.
    pub top_n: usize,
    /// Number of background worker threads executing prefetch loads.
    pub workers: usize,
    /// Time-to-live for a prefetched-but-unclaimed entry, in milliseconds.
    pub expiry_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence: 0.6,
            window: 10,
            top_n: 3,
            workers: 4,
            expiry_ms: 30_000,
        }
    }
}

/// Configuration for the adaptive TTL controller (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Whether the adaptive controller rewrites TTLs on its own schedule.
    pub enabled: bool,
    /// Interval between controller passes, in seconds.
    pub interval_s: u64,
    /// Base TTL applied to keys with no volatility history, in seconds.
    pub base_s: u64,
    /// Lower clamp on the cost/benefit multiplier.
    pub min_multiplier: f64,
    /// Upper clamp on the cost/benefit multiplier.
    pub max_multiplier: f64,
    /// Minimum relative change required before a TTL is rewritten.
    pub deadband: f64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_s: 300,
            base_s: 3600,
            min_multiplier: 0.1,
            max_multiplier: 10.0,
            deadband: 0.2,
        }
    }
}

/// Configuration for the GZIP-framed snapshot codec (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Whether snapshots are taken on a background schedule.
    pub enabled: bool,
    /// Interval between snapshots, in seconds.
    pub interval_s: u64,
    /// Destination path for the snapshot file.
    pub path: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_s: 300,
            path: "chronos.snapshot".to_string(),
        }
    }
}

/// Configuration for the health-scoring subsystem (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between health score recomputations, in seconds.
    pub interval_s: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { interval_s: 30 }
    }
}

/// Configuration for the RESP2/HTTP server front ends (§4.9, ADDED).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address shared by both front ends.
    pub host: String,
    /// TCP port for the RESP2 protocol listener.
    pub resp_port: u16,
    /// TCP port for the HTTP health/metrics/stats listener.
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            resp_port: 6380,
            http_port: 8088,
        }
    }
}

/// Logging configuration (ADDED, ambient stack).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `"info"` or `"chronos_core=debug"`.
    pub level: String,
    /// Output format: `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Aggregate configuration for a Chronos instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChronosConfig {
    /// Segmented store configuration.
    pub store: StoreConfig,
    /// Predictive prefetcher configuration.
    pub prefetch: PrefetchConfig,
    /// Adaptive TTL controller configuration.
    pub ttl: TtlConfig,
    /// Snapshot codec configuration.
    pub snapshot: SnapshotConfig,
    /// Health-scoring configuration.
    pub health: HealthConfig,
    /// Server front-end configuration.
    pub server: ServerConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl ChronosConfig {
    /// Loads configuration by layering defaults, an optional `chronos.toml`
    /// in the current directory, and `CHRONOS_*` environment variables.
    pub fn load() -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("chronos.toml"))
            .merge(Env::prefixed("CHRONOS_").split("_"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a specific TOML file path, still layered
    /// over defaults and environment variables.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CHRONOS_").split("_"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from an in-memory TOML string, layered over
    /// defaults only (no environment overrides). Primarily used by tests.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(contents))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes this configuration back to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validates cross-field invariants that `serde`'s per-field defaults
    /// cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.store.segments == 0 {
            return Err(Error::Config("store.segments must be >= 1".to_string()));
        }
        if self.store.max_memory_bytes == 0 {
            return Err(Error::Config(
                "store.max_memory_bytes must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.prefetch.confidence) {
            return Err(Error::Config(
                "prefetch.confidence must be within [0.0, 1.0]".to_string(),
            ));
        }
        if self.prefetch.workers == 0 && self.prefetch.enabled {
            return Err(Error::Config(
                "prefetch.workers must be >= 1 when prefetch.enabled is true".to_string(),
            ));
        }
        if self.ttl.min_multiplier <= 0.0 || self.ttl.min_multiplier > self.ttl.max_multiplier {
            return Err(Error::Config(
                "ttl.min_multiplier must be positive and <= ttl.max_multiplier".to_string(),
            ));
        }
        if self.ttl.deadband < 0.0 {
            return Err(Error::Config("ttl.deadband must be >= 0.0".to_string()));
        }
        Ok(())
    }

    /// Returns `store.segments` rounded up to the next power of two, the
    /// value actually used to size the segment array.
    #[must_use]
    pub fn effective_segment_count(&self) -> usize {
        self.store.segments.next_power_of_two()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ChronosConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_segments() {
        let mut config = ChronosConfig::default();
        config.store.segments = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_confidence_out_of_range() {
        let mut config = ChronosConfig::default();
        config.prefetch.confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_toml_overrides_defaults() {
        let config = ChronosConfig::from_toml(
            r#"
            [store]
            segments = 8
            max_memory_bytes = 1024

            [server]
            resp_port = 7000
            "#,
        )
        .unwrap();
        assert_eq!(config.store.segments, 8);
        assert_eq!(config.store.max_memory_bytes, 1024);
        assert_eq!(config.server.resp_port, 7000);
        // untouched sections keep their defaults
        assert_eq!(config.ttl.base_s, 3600);
    }

    #[test]
    fn effective_segment_count_rounds_up() {
        let mut config = ChronosConfig::default();
        config.store.segments = 10;
        assert_eq!(config.effective_segment_count(), 16);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ChronosConfig::default();
        let serialized = config.to_toml().unwrap();
        let parsed = ChronosConfig::from_toml(&serialized).unwrap();
        assert_eq!(parsed.store.segments, config.store.segments);
    }
}
