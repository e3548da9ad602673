//! Predictive prefetcher: learns a first-order Markov transition matrix
//! over observed key accesses and speculatively loads likely next keys
//! through a pluggable [`DataLoader`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::config::PrefetchConfig;
use crate::store::Store;

/// Bounds a single transition row's fan-out. Once a row reaches this many
/// distinct target keys, further never-before-seen targets are ignored;
/// existing ones still increment. Keeps memory bounded without a separate
/// GC sweep over the matrix.
const ROW_CAPACITY_CAP: usize = 64;

/// External collaborator that performs the actual (possibly slow) key
/// load on behalf of a prefetch dispatch. Implementations may block and
/// may return `None` to indicate the key could not be produced.
pub trait DataLoader: Send + Sync {
    /// Loads the value for `key`, or `None` if unavailable.
    fn load(&self, key: &str) -> Option<Vec<u8>>;
}

#[derive(Default)]
struct DistributionRow {
    counts: Mutex<FxHashMap<String, u64>>,
    total: AtomicU64,
}

impl DistributionRow {
    fn record(&self, target: &str) {
        let mut counts = self.counts.lock();
        if !counts.contains_key(target) && counts.len() >= ROW_CAPACITY_CAP {
            return;
        }
        *counts.entry(target.to_string()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Targets with transition probability `>= confidence`, ranked
    /// descending, truncated to `top_n`.
    fn top_predictions(&self, confidence: f64, top_n: usize) -> Vec<String> {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return Vec::new();
        }
        let counts = self.counts.lock();
        let mut ranked: Vec<(String, f64)> = counts
            .iter()
            .map(|(key, count)| (key.clone(), *count as f64 / total as f64))
            .filter(|(_, p)| *p >= confidence)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_n);
        ranked.into_iter().map(|(key, _)| key).collect()
    }
}

/// Learns access sequences and issues speculative loads for likely next
/// keys. Foreground threads call [`Prefetcher::record_access`] and
/// [`Prefetcher::on_read_hit`]; everything else runs on a fixed worker
/// pool so a slow or failing `DataLoader` never blocks a client request.
pub struct Prefetcher {
    transitions: DashMap<String, Arc<DistributionRow>>,
    recent: Mutex<VecDeque<String>>,
    predicted: DashMap<String, Instant>,
    predictions_made: AtomicU64,
    predictions_hit: AtomicU64,
    config: PrefetchConfig,
    sender: crossbeam_channel::Sender<PrefetchTask>,
    default_ttl_s: u64,
}

struct PrefetchTask {
    key: String,
}

impl Prefetcher {
    /// Builds a prefetcher and spawns its fixed-size worker pool. Workers
    /// exit once `sender` (held only by this struct and clones handed to
    /// `record_access`) is dropped and the channel drains.
    #[must_use]
    pub fn new(config: PrefetchConfig, store: Arc<Store>, loader: Arc<dyn DataLoader>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<PrefetchTask>();
        let default_ttl_s = 300;
        for _ in 0..config.workers.max(1) {
            let receiver = receiver.clone();
            let store = Arc::clone(&store);
            let loader = Arc::clone(&loader);
            std::thread::spawn(move || {
                while let Ok(task) = receiver.recv() {
                    match loader.load(&task.key) {
                        Some(value) => store.set(&task.key, value, default_ttl_s, 0),
                        None => tracing::debug!(key = %task.key, "prefetch load returned absent"),
                    }
                }
            });
        }
        Self {
            transitions: DashMap::new(),
            recent: Mutex::new(VecDeque::with_capacity(config.window.max(1))),
            predicted: DashMap::new(),
            predictions_made: AtomicU64::new(0),
            predictions_hit: AtomicU64::new(0),
            config,
            sender,
            default_ttl_s,
        }
    }

    /// Records a completed read (hit or miss) of `key`, updates the
    /// transition matrix, and dispatches predictions for likely next
    /// keys. A window of `0` disables prediction entirely (boundary case).
    pub fn record_access(&self, current: &str, store: &Store) {
        if self.config.window == 0 || !self.config.enabled {
            return;
        }

        let snapshot: Vec<String> = {
            let mut recent = self.recent.lock();
            let snapshot = recent.iter().cloned().collect();
            recent.push_back(current.to_string());
            while recent.len() > self.config.window {
                recent.pop_front();
            }
            snapshot
        };

        for prev in &snapshot {
            let row = self
                .transitions
                .entry(prev.clone())
                .or_insert_with(|| Arc::new(DistributionRow::default()))
                .clone();
            row.record(current);
        }

        self.predict_and_dispatch(current, store);
        self.expire_predictions();
    }

    fn predict_and_dispatch(&self, current: &str, store: &Store) {
        let Some(row) = self.transitions.get(current).map(|r| r.clone()) else {
            return;
        };
        let targets = row.top_predictions(self.config.confidence, self.config.top_n);
        let mut dispatched = 0u64;
        for target in targets {
            if store.contains(&target) {
                continue;
            }
            self.predicted.insert(target.clone(), Instant::now());
            if self.sender.send(PrefetchTask { key: target }).is_ok() {
                dispatched += 1;
            }
        }
        if dispatched > 0 {
            self.predictions_made.fetch_add(dispatched, Ordering::Relaxed);
        }
    }

    /// Reports a foreground read that resolved to a hit. If `key` was
    /// recently predicted and the prediction has not expired, counts it
    /// towards the accuracy ratio.
    pub fn on_read_hit(&self, key: &str) {
        if let Some((_, predicted_at)) = self.predicted.remove(key) {
            if predicted_at.elapsed() <= self.pred_expiry() {
                self.predictions_hit.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn pred_expiry(&self) -> Duration {
        Duration::from_millis(self.config.expiry_ms)
    }

    fn expire_predictions(&self) {
        let expiry = self.pred_expiry();
        self.predicted.retain(|_, at| at.elapsed() <= expiry);
    }

    /// `predictions_hit / max(1, predictions_made)`.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let made = self.predictions_made.load(Ordering::Relaxed).max(1);
        self.predictions_hit.load(Ordering::Relaxed) as f64 / made as f64
    }

    /// Raw dispatch and hit counters, for metrics exposition.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) {
        (
            self.predictions_made.load(Ordering::Relaxed),
            self.predictions_hit.load(Ordering::Relaxed),
        )
    }
}
