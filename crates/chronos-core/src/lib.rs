//! # Chronos Core
//!
//! The concurrency-and-intelligence engine behind Chronos: an in-memory
//! key-value cache with bounded memory, per-entry expiration, a
//! statistical predictive prefetcher, and an adaptive TTL controller.
//!
//! This crate owns everything below the wire protocol: the segmented,
//! lock-striped [`store`], the [`prefetch`]er that learns a first-order
//! transition distribution over key accesses, the [`ttl`] controller that
//! rewrites per-entry lifetimes from observed cost/benefit signals, the
//! [`snapshot`] codec, and the [`metrics`] + health scorer consumed by the
//! external protocol/HTTP boundary (`chronos-server`).
//!
//! ## Quick start
//!
//! ```
//! use chronos_core::{ChronosConfig, Store};
//!
//! let config = ChronosConfig::default();
//! let store = Store::new(&config.store);
//! store.set("user:1", b"Alice".to_vec(), 0, 0);
//! assert_eq!(store.get("user:1"), Some(b"Alice".to_vec()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod metrics;
pub mod prefetch;
pub mod scheduler;
pub mod segment;
pub mod snapshot;
pub mod store;
pub mod ttl;

pub use config::{ChronosConfig, EvictionKind, PrefetchConfig, ServerConfig, SnapshotConfig, StoreConfig, TtlConfig};
pub use entry::Entry;
pub use error::{Error, Result};
pub use eviction::EvictionPolicy;
pub use metrics::{Counters, HealthReport, HealthScorer, HealthStatus, LatencyHistogram};
pub use prefetch::{DataLoader, Prefetcher};
pub use scheduler::Scheduler;
pub use segment::{Segment, SegmentStats};
pub use snapshot::SnapshotCodec;
pub use store::{glob_match, Store, StoreStats};
pub use ttl::{TtlController, VolatilityEstimator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_start_round_trips() {
        let config = ChronosConfig::default();
        let store = Store::new(&config.store);
        store.set("user:1", b"Alice".to_vec(), 0, 0);
        assert_eq!(store.get("user:1"), Some(b"Alice".to_vec()));
        assert!(store.delete("user:1"));
        assert_eq!(store.get("user:1"), None);
    }
}
