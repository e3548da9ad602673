//! Cache entries: the unit of storage owned by exactly one [`crate::segment::Segment`].

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Sentinel stored in [`Entry::expires_at_wall`] meaning "never expires".
pub const NEVER: i64 = i64::MAX;

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic nanoseconds since process start. Used instead of storing
/// `Instant` directly so timestamps can live in atomics.
pub fn now_mono_nanos() -> u64 {
    process_epoch().elapsed().as_nanos() as u64
}

/// Milliseconds since the Unix epoch, the wall-clock basis for TTL bookkeeping.
pub fn now_wall_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

/// A deterministic 32-bit FNV-1a hash of value bytes, used to detect whether
/// a replacement actually changed the stored value (feeds the volatility
/// estimator in §4.6).
#[must_use]
pub fn hash_value(bytes: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A single cached value plus its bookkeeping metadata.
///
/// `value`, `value_hash`, `size_bytes`, `created_at_mono` and `compute_cost_ms`
/// are fixed at construction. `last_access_mono`, `access_count` and
/// `expires_at_wall` may be mutated after construction — the first two via
/// plain atomics so `touch()` can run without the segment write lock, the
/// last one only by `set_ttl`, which requires the write lock.
#[derive(Debug)]
pub struct Entry {
    value: Vec<u8>,
    value_hash: u32,
    size_bytes: u64,
    compute_cost_ms: u64,
    created_at_mono: u64,
    last_access_mono: AtomicU64,
    access_count: AtomicU64,
    expires_at_wall: AtomicI64,
}

impl Entry {
    /// Builds a new entry. `ttl_seconds == 0` means "never expires".
    /// `overhead_bytes` is the fixed per-entry bookkeeping cost `O` charged
    /// against the owning segment's budget in addition to the value length.
    #[must_use]
    pub fn new(value: Vec<u8>, ttl_seconds: u64, overhead_bytes: u64, compute_cost_ms: u64) -> Self {
        let now_mono = now_mono_nanos();
        let expires_at_wall = if ttl_seconds == 0 {
            NEVER
        } else {
            now_wall_ms().saturating_add((ttl_seconds as i64).saturating_mul(1000))
        };
        let value_hash = hash_value(&value);
        let size_bytes = overhead_bytes + value.len() as u64;
        Self {
            value,
            value_hash,
            size_bytes,
            compute_cost_ms,
            created_at_mono: now_mono,
            last_access_mono: AtomicU64::new(now_mono),
            access_count: AtomicU64::new(0),
            expires_at_wall: AtomicI64::new(expires_at_wall),
        }
    }

    /// The stored value bytes.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The 32-bit FNV hash of the stored value.
    #[must_use]
    pub fn value_hash(&self) -> u32 {
        self.value_hash
    }

    /// Total bytes charged against the owning segment's budget, including
    /// the fixed per-entry overhead. Immutable once set (I-invariant).
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Cost hint carried with the entry, used by the TTL benefit formula.
    #[must_use]
    pub fn compute_cost_ms(&self) -> u64 {
        self.compute_cost_ms
    }

    /// Monotonic construction timestamp, in nanoseconds since process start.
    #[must_use]
    pub fn created_at_mono(&self) -> u64 {
        self.created_at_mono
    }

    /// Monotonic timestamp of the most recent access.
    #[must_use]
    pub fn last_access_mono(&self) -> u64 {
        self.last_access_mono.load(Ordering::Acquire)
    }

    /// Number of reads observed since construction.
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Acquire)
    }

    /// Wall-clock expiry, in milliseconds since the Unix epoch, or
    /// [`NEVER`].
    #[must_use]
    pub fn expires_at_wall(&self) -> i64 {
        self.expires_at_wall.load(Ordering::Acquire)
    }

    /// Whether this entry has expired as of `now_wall_ms`. Expiry is strict:
    /// an entry observed at exactly its expiry instant has not yet expired.
    #[must_use]
    pub fn is_expired(&self, now_wall_ms: i64) -> bool {
        let expires_at = self.expires_at_wall();
        expires_at != NEVER && now_wall_ms > expires_at
    }

    /// Records a read: bumps `last_access_mono` and `access_count`. Safe to
    /// call without the segment write lock since both fields are atomic.
    pub fn touch(&self) {
        self.last_access_mono.store(now_mono_nanos(), Ordering::Release);
        self.access_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Rewrites the expiry instant. Requires the segment write lock since it
    /// changes a value other readers may be mid-comparison against.
    pub fn set_ttl(&self, seconds: u64) {
        let expires_at = if seconds == 0 {
            NEVER
        } else {
            now_wall_ms().saturating_add((seconds as i64).saturating_mul(1000))
        };
        self.expires_at_wall.store(expires_at, Ordering::Release);
    }

    /// Remaining TTL in seconds, or `None` if the entry never expires.
    #[must_use]
    pub fn ttl_remaining_s(&self, now_wall_ms: i64) -> Option<i64> {
        let expires_at = self.expires_at_wall();
        if expires_at == NEVER {
            None
        } else {
            Some(((expires_at - now_wall_ms) / 1000).max(0))
        }
    }

    /// Accesses per hour, extrapolated from `access_count` and entry age:
    /// `(access_count / max(1, age_ms)) * 3_600_000`.
    #[must_use]
    pub fn accesses_per_hour(&self) -> f64 {
        let age_ms = ((now_mono_nanos().saturating_sub(self.created_at_mono)) / 1_000_000).max(1);
        (self.access_count() as f64 / age_ms as f64) * 3_600_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn never_expiring_entry_has_never_sentinel() {
        let entry = Entry::new(b"v".to_vec(), 0, 56, 0);
        assert_eq!(entry.expires_at_wall(), NEVER);
        assert!(!entry.is_expired(now_wall_ms() + 1_000_000));
        assert_eq!(entry.ttl_remaining_s(now_wall_ms()), None);
    }

    #[test]
    fn ttl_expiry_is_strict() {
        let entry = Entry::new(b"v".to_vec(), 1, 56, 0);
        let expires_at = entry.expires_at_wall();
        assert!(!entry.is_expired(expires_at));
        assert!(entry.is_expired(expires_at + 1));
    }

    #[test]
    fn size_bytes_includes_overhead() {
        let entry = Entry::new(vec![0u8; 300], 0, 120, 0);
        assert_eq!(entry.size_bytes(), 420);
    }

    #[test]
    fn touch_increments_access_count_and_bumps_last_access() {
        let entry = Entry::new(b"v".to_vec(), 0, 56, 0);
        let created = entry.created_at_mono();
        assert_eq!(entry.access_count(), 0);
        thread::sleep(Duration::from_millis(5));
        entry.touch();
        assert_eq!(entry.access_count(), 1);
        assert!(entry.last_access_mono() >= created);
    }

    #[test]
    fn set_ttl_rewrites_expiry() {
        let entry = Entry::new(b"v".to_vec(), 3600, 56, 0);
        entry.set_ttl(0);
        assert_eq!(entry.expires_at_wall(), NEVER);
    }

    #[test]
    fn hash_value_is_deterministic_and_sensitive_to_content() {
        assert_eq!(hash_value(b"hello"), hash_value(b"hello"));
        assert_ne!(hash_value(b"hello"), hash_value(b"world"));
    }
}
