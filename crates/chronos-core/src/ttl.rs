//! Adaptive TTL controller: periodically rewrites each live entry's TTL
//! from observed access frequency, compute cost, and value volatility.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::config::TtlConfig;
use crate::store::Store;

/// Bound on the number of recent change timestamps kept per key.
const HISTORY_CAP: usize = 10;

/// Default volatility assumed for a key with fewer than two observed
/// value changes.
const DEFAULT_VOLATILITY: f64 = 0.5;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

/// Tracks how often a key's stored value actually changes, to estimate how
/// "volatile" it is. Fed by `record_change` on any SET whose new value
/// hash differs from the previous entry's.
pub struct VolatilityEstimator {
    history: Mutex<FxHashMap<String, VecDeque<i64>>>,
}

impl VolatilityEstimator {
    /// Builds an empty estimator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: Mutex::new(FxHashMap::default()),
        }
    }

    /// Records that `key`'s value changed at the current wall-clock
    /// instant.
    pub fn record_change(&self, key: &str) {
        let mut history = self.history.lock();
        let entries = history.entry(key.to_string()).or_default();
        entries.push_back(now_ms());
        while entries.len() > HISTORY_CAP {
            entries.pop_front();
        }
    }

    /// `v(key) = 3_600_000 / max(1, mean_inter_arrival_ms)`, or the
    /// default volatility if fewer than two samples have been observed.
    #[must_use]
    pub fn volatility(&self, key: &str) -> f64 {
        let history = self.history.lock();
        let Some(entries) = history.get(key) else {
            return DEFAULT_VOLATILITY;
        };
        if entries.len() < 2 {
            return DEFAULT_VOLATILITY;
        }
        let span = entries.back().unwrap() - entries.front().unwrap();
        let mean_inter_arrival_ms = span as f64 / (entries.len() - 1) as f64;
        3_600_000.0 / mean_inter_arrival_ms.max(1.0)
    }
}

impl Default for VolatilityEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically walks every live key and retargets its TTL from a
/// cost/benefit formula balancing access frequency and compute cost
/// against size and volatility.
pub struct TtlController {
    config: TtlConfig,
    volatility: VolatilityEstimator,
}

impl TtlController {
    /// Builds a controller from its configuration.
    #[must_use]
    pub fn new(config: TtlConfig) -> Self {
        Self {
            config,
            volatility: VolatilityEstimator::new(),
        }
    }

    /// The shared volatility estimator, fed by the dispatcher on every SET
    /// that changes a key's stored value.
    #[must_use]
    pub fn volatility_estimator(&self) -> &VolatilityEstimator {
        &self.volatility
    }

    /// `benefit / max(1, cost)`, clamped to `[min_multiplier,
    /// max_multiplier]`.
    #[must_use]
    pub fn multiplier(&self, accesses_per_hour: f64, compute_cost_ms: u64, size_bytes: u64, volatility: f64) -> f64 {
        let benefit = accesses_per_hour * (compute_cost_ms.max(1)) as f64;
        let cost = size_bytes as f64 * volatility.max(f64::EPSILON);
        (benefit / cost.max(1.0)).clamp(self.config.min_multiplier, self.config.max_multiplier)
    }

    /// Target TTL in seconds: `base_s * multiplier`.
    #[must_use]
    pub fn target_ttl_s(&self, multiplier: f64) -> u64 {
        (self.config.base_s as f64 * multiplier).round() as u64
    }

    /// Walks every key in `store`, recomputing and conditionally rewriting
    /// its TTL. Rewrites only fire when the relative change exceeds the
    /// configured deadband. Returns the number of keys actually rewritten.
    pub fn run_pass(&self, store: &Store) -> usize {
        let mut rewritten = 0;
        for key in store.keys() {
            let Some((accesses_per_hour, compute_cost_ms, size_bytes, current_ttl_s)) =
                store.with_entry(&key, |entry| {
                    (
                        entry.accesses_per_hour(),
                        entry.compute_cost_ms(),
                        entry.size_bytes(),
                        entry.ttl_remaining_s(now_ms()).unwrap_or(self.config.base_s as i64),
                    )
                })
            else {
                continue;
            };

            let volatility = self.volatility.volatility(&key);
            let multiplier = self.multiplier(accesses_per_hour, compute_cost_ms, size_bytes, volatility);
            let target_ttl_s = self.target_ttl_s(multiplier);

            let current = current_ttl_s.max(1) as f64;
            let relative_change = (target_ttl_s as f64 - current).abs() / current;
            if relative_change > self.config.deadband {
                store.set_ttl(&key, target_ttl_s);
                rewritten += 1;
            }
        }
        rewritten
    }
}
