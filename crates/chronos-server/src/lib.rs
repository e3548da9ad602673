//! RESP2 and HTTP boundary for the Chronos cache.
//!
//! This crate owns everything `chronos-core` deliberately stays agnostic
//! of: wire framing, command dispatch, CLI/config wiring, and the
//! background schedulers that drive the core's periodic passes (expiry
//! sweep, adaptive TTL rewrite, snapshot write, health scoring). Every
//! RESP2 connection handler and HTTP route shares one `AppState` holding
//! an `Arc<Store>` plus `Arc<Prefetcher>`/`Arc<TtlController>`.

pub mod http;
pub mod loader;
pub mod resp;
pub mod state;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chronos_core::{ChronosConfig, LatencyHistogram, Prefetcher, SnapshotCodec, Store, TtlController};

use crate::loader::NullDataLoader;
use crate::state::{initial_health_report, AppState, EvictionRate};

/// A fully wired Chronos instance: the shared [`AppState`] plus the
/// background schedulers that keep it up to date. Building this is the
/// single entry point both the `chronos-server` binary and integration
/// tests use to stand up a cache.
pub struct App {
    /// State shared by every RESP2 connection handler and HTTP route.
    pub state: Arc<AppState>,
    config: ChronosConfig,
    schedulers: Vec<chronos_core::Scheduler>,
}

impl App {
    /// Builds the shared state from `config` and restores a snapshot from
    /// `config.snapshot.path` if one exists (a missing file is not an
    /// error — see §4.7).
    #[must_use]
    pub fn new(config: ChronosConfig) -> Self {
        let store = Arc::new(Store::new(&config.store));

        if config.snapshot.enabled {
            match SnapshotCodec::restore(&store, &config.snapshot.path) {
                Ok(loaded) => tracing::info!(loaded, path = %config.snapshot.path, "restored snapshot"),
                Err(err) => tracing::warn!(%err, path = %config.snapshot.path, "snapshot restore failed, starting empty"),
            }
        }

        let prefetcher = Arc::new(Prefetcher::new(
            config.prefetch.clone(),
            Arc::clone(&store),
            Arc::new(NullDataLoader),
        ));
        let ttl_controller = Arc::new(TtlController::new(config.ttl.clone()));

        let state = Arc::new(AppState {
            store,
            prefetcher,
            ttl_controller,
            latency: Arc::new(LatencyHistogram::new()),
            eviction_rate: Arc::new(EvictionRate::new(0)),
            health: Arc::new(RwLock::new(initial_health_report())),
            max_key_bytes: config.store.max_key_bytes,
            max_value_bytes: config.store.max_value_bytes,
        });

        Self {
            state,
            config,
            schedulers: Vec::new(),
        }
    }

    /// Spawns the background schedulers (expiry sweep, adaptive TTL
    /// rewrite, snapshot write, health scoring) described in §5 of the
    /// design. Each runs on its own daemon thread until [`App::shutdown`]
    /// is called.
    pub fn start_background_tasks(&mut self) {
        let sweep_state = Arc::clone(&self.state);
        self.schedulers.push(chronos_core::Scheduler::spawn(
            "expiry-sweep",
            Duration::from_secs(self.config.store.expiry_sweep_interval_s.max(1)),
            move || {
                let removed = sweep_state.store.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "expiry sweep removed stale entries");
                }
            },
        ));

        if self.config.ttl.enabled {
            let ttl_state = Arc::clone(&self.state);
            self.schedulers.push(chronos_core::Scheduler::spawn(
                "ttl-rewrite",
                Duration::from_secs(self.config.ttl.interval_s.max(1)),
                move || {
                    let rewritten = ttl_state.ttl_controller.run_pass(&ttl_state.store);
                    if rewritten > 0 {
                        tracing::debug!(rewritten, "adaptive TTL pass rewrote entries");
                    }
                },
            ));
        }

        if self.config.snapshot.enabled {
            let snapshot_state = Arc::clone(&self.state);
            let path = self.config.snapshot.path.clone();
            self.schedulers.push(chronos_core::Scheduler::spawn(
                "snapshot-writer",
                Duration::from_secs(self.config.snapshot.interval_s.max(1)),
                move || match SnapshotCodec::write(&snapshot_state.store, &path) {
                    Ok(written) => tracing::info!(written, %path, "wrote snapshot"),
                    Err(err) => tracing::warn!(%err, %path, "snapshot write failed"),
                },
            ));
        }

        let health_state = Arc::clone(&self.state);
        self.schedulers.push(chronos_core::Scheduler::spawn(
            "health-scorer",
            Duration::from_secs(self.config.health.interval_s.max(1)),
            move || health_state.refresh_health(),
        ));
    }

    /// Stops every background scheduler, each draining its in-flight tick
    /// for up to the grace period documented on [`chronos_core::Scheduler::stop`].
    pub fn shutdown(self) {
        for scheduler in self.schedulers {
            scheduler.stop();
        }
    }

    /// The server front-end configuration (bind host and ports).
    #[must_use]
    pub fn server_config(&self) -> &chronos_core::ServerConfig {
        &self.config.server
    }

    /// The snapshot configuration, consulted by the binary to decide
    /// whether to write a final snapshot on shutdown.
    #[must_use]
    pub fn snapshot_config(&self) -> &chronos_core::SnapshotConfig {
        &self.config.snapshot
    }
}
