//! Shared application state: the `Arc`s every connection handler and HTTP
//! route borrows — `Arc<Store>` plus `Arc<Prefetcher>`, `Arc<TtlController>`,
//! and a small cache of the last computed health report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chronos_core::{Counters, HealthReport, HealthScorer, HealthStatus, LatencyHistogram, Prefetcher, Store, TtlController};

/// Tracks evictions-per-second between successive health scoring passes.
pub struct EvictionRate {
    last_evictions: AtomicU64,
    last_sampled_at: RwLock<Instant>,
}

impl EvictionRate {
    /// Starts the tracker from a baseline evictions count.
    #[must_use]
    pub fn new(initial_evictions: u64) -> Self {
        Self {
            last_evictions: AtomicU64::new(initial_evictions),
            last_sampled_at: RwLock::new(Instant::now()),
        }
    }

    /// Records a new total evictions count and returns the evictions/sec
    /// observed since the previous sample.
    pub fn sample(&self, current_evictions: u64) -> f64 {
        let now = Instant::now();
        let previous = self.last_evictions.swap(current_evictions, Ordering::AcqRel);
        let elapsed = {
            let mut last_sampled_at = self.last_sampled_at.write().expect("eviction rate lock poisoned");
            let elapsed = now.duration_since(*last_sampled_at).as_secs_f64();
            *last_sampled_at = now;
            elapsed
        };
        let delta = current_evictions.saturating_sub(previous) as f64;
        delta / elapsed.max(0.001)
    }
}

/// Everything a RESP2 connection handler or HTTP route needs: the live
/// store, the prefetcher and TTL controller it must feed on every
/// command, the latency histogram it records into, and the most recently
/// computed health report.
pub struct AppState {
    /// The segmented key-value store.
    pub store: Arc<Store>,
    /// The predictive prefetcher, fed on every GET/SET.
    pub prefetcher: Arc<Prefetcher>,
    /// The adaptive TTL controller, whose volatility estimator is fed on
    /// every value-changing SET.
    pub ttl_controller: Arc<TtlController>,
    /// Per-operation latency histogram.
    pub latency: Arc<LatencyHistogram>,
    /// Evictions/sec tracker consulted by the health scorer.
    pub eviction_rate: Arc<EvictionRate>,
    /// The most recently computed health report, refreshed on the
    /// health scheduler's own timer and read directly by HTTP handlers.
    pub health: Arc<RwLock<HealthReport>>,
    /// Maximum accepted key length, in bytes.
    pub max_key_bytes: usize,
    /// Maximum accepted value length, in bytes.
    pub max_value_bytes: usize,
}

impl AppState {
    /// Recomputes the cached health report from current store counters
    /// and latency percentiles. Called by the health scheduler.
    pub fn refresh_health(&self) {
        let stats = self.store.stats();
        let counters: Counters = stats.into();
        let p99 = Duration::from_micros(self.latency.p99());
        let evictions_per_sec = self.eviction_rate.sample(stats.evictions);
        let report = HealthScorer::score(counters, p99, evictions_per_sec);
        *self.health.write().expect("health lock poisoned") = report;
    }

    /// A snapshot of the cached health report.
    #[must_use]
    pub fn health_snapshot(&self) -> HealthReport {
        self.health.read().expect("health lock poisoned").clone()
    }
}

/// The default, pre-first-sample health report: healthy with no issues.
#[must_use]
pub fn initial_health_report() -> HealthReport {
    HealthReport {
        score: 100,
        status: HealthStatus::Healthy,
        issues: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_rate_reports_delta_over_elapsed_time() {
        let tracker = EvictionRate::new(0);
        std::thread::sleep(Duration::from_millis(20));
        let rate = tracker.sample(10);
        assert!(rate > 0.0);
    }

    #[test]
    fn eviction_rate_is_zero_with_no_new_evictions() {
        let tracker = EvictionRate::new(5);
        std::thread::sleep(Duration::from_millis(5));
        let rate = tracker.sample(5);
        assert_eq!(rate, 0.0);
    }
}
