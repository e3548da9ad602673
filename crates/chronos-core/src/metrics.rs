//! Latency histogram, point-in-time counters, and the 0-100 health score
//! derived from both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::store::StoreStats;

/// Number of log-spaced buckets. Each bucket's upper bound is
/// `1.001^bucket_index` microseconds; `ceil(ln(3_600_000_000)/ln(1.001))`
/// is ~22_016, so this many buckets are needed to actually reach
/// 3_600_000_000 microseconds (3_600 s) rather than saturating at a few
/// milliseconds, the precision/range the design calls for.
const BUCKET_COUNT: usize = 22_016;
const GROWTH_FACTOR: f64 = 1.001;

/// A log-bucketed latency histogram recording per-operation durations in
/// microseconds. Bucket boundaries grow geometrically so the same
/// structure covers microsecond and multi-second operations with uniform
/// relative error.
pub struct LatencyHistogram {
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
}

impl LatencyHistogram {
    /// Builds an empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
        }
    }

    fn bucket_for_micros(micros: u64) -> usize {
        if micros == 0 {
            return 0;
        }
        let index = (micros as f64).ln() / GROWTH_FACTOR.ln();
        (index.floor() as usize).min(BUCKET_COUNT - 1)
    }

    fn micros_for_bucket(bucket: usize) -> u64 {
        GROWTH_FACTOR.powi(bucket as i32).round() as u64
    }

    /// Records one observed operation duration.
    pub fn record(&self, duration: Duration) {
        let micros = duration.as_micros().min(u64::MAX as u128) as u64;
        let bucket = Self::bucket_for_micros(micros);
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// The requested percentile (`0.0..=1.0`) in microseconds, or `0` if no
    /// observations have been recorded.
    #[must_use]
    pub fn percentile(&self, p: f64) -> u64 {
        let total = self.count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }
        let target = ((total as f64) * p).ceil() as u64;
        let mut cumulative = 0u64;
        for (bucket, counter) in self.buckets.iter().enumerate() {
            cumulative += counter.load(Ordering::Relaxed);
            if cumulative >= target {
                return Self::micros_for_bucket(bucket);
            }
        }
        Self::micros_for_bucket(BUCKET_COUNT - 1)
    }

    /// P50 in microseconds.
    #[must_use]
    pub fn p50(&self) -> u64 {
        self.percentile(0.50)
    }

    /// P95 in microseconds.
    #[must_use]
    pub fn p95(&self) -> u64 {
        self.percentile(0.95)
    }

    /// P99 in microseconds.
    #[must_use]
    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Flattened snapshot of cache counters, suitable for JSON/Prometheus
/// exposition.
#[derive(Debug, Clone, Copy)]
pub struct Counters {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// `hits / (hits + misses)`, or `0.0` if both are zero.
    pub hit_rate: f64,
    /// Entries removed to make room for a put.
    pub evictions: u64,
    /// Current total bytes held across all segments.
    pub memory_bytes: u64,
    /// Current total live entries.
    pub entry_count: usize,
}

impl From<StoreStats> for Counters {
    fn from(stats: StoreStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            hit_rate: stats.hit_rate(),
            evictions: stats.evictions,
            memory_bytes: stats.memory_used,
            entry_count: stats.entry_count,
        }
    }
}

/// Overall health status derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Score strictly greater than 70.
    Healthy,
    /// Score 70 or below.
    Degraded,
}

impl HealthStatus {
    /// Lowercase status string, as exposed over HTTP.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
        }
    }
}

/// A computed health snapshot: a 0-100 score, its status, and the
/// individual issues that contributed deductions.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Score in `0..=100`.
    pub score: u32,
    /// Derived status.
    pub status: HealthStatus,
    /// Human-readable remediation hints, one per deduction applied.
    pub issues: Vec<String>,
}

/// Derives a 0-100 health score from hit rate, tail latency, and eviction
/// pressure, starting at 100 and subtracting for each signal that crosses
/// a threshold.
pub struct HealthScorer;

impl HealthScorer {
    /// Computes a health report from the current counters, P99 latency,
    /// and an evictions/second rate already computed by the caller (the
    /// scorer itself is stateless; the caller supplies a derivative over
    /// its own sampling interval).
    #[must_use]
    pub fn score(counters: Counters, p99: Duration, evictions_per_sec: f64) -> HealthReport {
        let mut score: i64 = 100;
        let mut issues = Vec::new();

        if counters.hit_rate < 0.5 {
            score -= 30;
            issues.push("hit rate below 50% — consider increasing memory budget or reviewing key access patterns".to_string());
        } else if counters.hit_rate < 0.7 {
            score -= 15;
            issues.push("hit rate below 70% — cache may be undersized for the working set".to_string());
        }

        let p99_ms = p99.as_secs_f64() * 1000.0;
        if p99_ms > 10.0 {
            score -= 20;
            issues.push("P99 latency above 10ms — check for lock contention or oversized values".to_string());
        } else if p99_ms > 5.0 {
            score -= 10;
            issues.push("P99 latency above 5ms — monitor for emerging contention".to_string());
        }

        if evictions_per_sec > 100.0 {
            score -= 25;
            issues.push("eviction rate above 100/s — increase memory budget or segment count".to_string());
        } else if evictions_per_sec > 50.0 {
            score -= 15;
            issues.push("eviction rate above 50/s — cache is under sustained memory pressure".to_string());
        }

        let score = score.clamp(0, 100) as u32;
        let status = if score > 70 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport { score, status, issues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_percentiles_are_zero() {
        let histogram = LatencyHistogram::new();
        assert_eq!(histogram.p50(), 0);
        assert_eq!(histogram.p99(), 0);
    }

    #[test]
    fn percentiles_track_recorded_durations() {
        let histogram = LatencyHistogram::new();
        for micros in 1..=100u64 {
            histogram.record(Duration::from_micros(micros));
        }
        let p50 = histogram.p50();
        let p99 = histogram.p99();
        assert!(p50 < p99);
        assert!(p50 >= 40 && p50 <= 60, "p50 = {p50}");
        assert!(p99 >= 90, "p99 = {p99}");
    }

    #[test]
    fn healthy_counters_score_above_seventy() {
        let counters = Counters {
            hits: 950,
            misses: 50,
            hit_rate: 0.95,
            evictions: 1,
            memory_bytes: 1024,
            entry_count: 10,
        };
        let report = HealthScorer::score(counters, Duration::from_millis(1), 0.0);
        assert_eq!(report.score, 100);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn low_hit_rate_degrades_score() {
        let counters = Counters {
            hits: 10,
            misses: 90,
            hit_rate: 0.1,
            evictions: 0,
            memory_bytes: 0,
            entry_count: 0,
        };
        let report = HealthScorer::score(counters, Duration::from_millis(1), 0.0);
        assert_eq!(report.score, 70);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn compounding_issues_can_drop_to_zero() {
        let counters = Counters {
            hits: 1,
            misses: 99,
            hit_rate: 0.01,
            evictions: 1000,
            memory_bytes: 0,
            entry_count: 0,
        };
        let report = HealthScorer::score(counters, Duration::from_millis(50), 500.0);
        assert_eq!(report.score, 25);
        assert_eq!(report.issues.len(), 3);
    }
}
