//! A single striped partition of the [`crate::store::Store`]: its own
//! table, lock, memory budget and counters.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::entry::{now_wall_ms, Entry};
use crate::eviction::EvictionPolicy;

/// Point-in-time counters for one segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentStats {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing (missing or expired).
    pub misses: u64,
    /// Entries removed to make room for a put.
    pub evictions: u64,
    /// Current sum of `size_bytes` across live entries.
    pub memory_used: u64,
    /// Number of live entries.
    pub entry_count: usize,
}

/// One lock-striped partition of the cache's keyspace.
///
/// `table` is protected by a single reader/writer lock; `hits`, `misses`,
/// `evictions` and `memory_used` are plain atomics so foreign readers (the
/// `stats()` fan-out) never need to take the segment lock at all.
pub struct Segment {
    table: RwLock<IndexMap<String, Entry>>,
    budget_bytes: u64,
    policy: EvictionPolicy,
    memory_used: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Segment {
    /// Builds an empty segment with the given memory budget and eviction
    /// policy.
    #[must_use]
    pub fn new(budget_bytes: u64, policy: EvictionPolicy) -> Self {
        Self {
            table: RwLock::new(IndexMap::new()),
            budget_bytes,
            policy,
            memory_used: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// The immutable memory ceiling for this segment.
    #[must_use]
    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Current sum of `size_bytes` across live entries (I1).
    #[must_use]
    pub fn memory_used(&self) -> u64 {
        self.memory_used.load(Ordering::Acquire)
    }

    /// Reads a key. Returns the value bytes on a non-expired hit.
    ///
    /// An expired entry found under the read lock cannot be physically
    /// removed without the write lock; this drops the read lock and
    /// re-acquires the write lock to perform the removal, keeping I1
    /// re-established before returning.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = now_wall_ms();
        {
            let table = self.table.read();
            if let Some(entry) = table.get(key) {
                if !entry.is_expired(now) {
                    self.policy.on_access(key, entry);
                    entry.touch();
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value().to_vec());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Present but expired: upgrade to the write lock and remove it.
        self.remove_if_expired(key, now);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn remove_if_expired(&self, key: &str, now: i64) {
        let mut table = self.table.write();
        if let Some(entry) = table.get(key) {
            if entry.is_expired(now) {
                let removed = table.shift_remove(key);
                if let Some(removed) = removed {
                    self.memory_used
                        .fetch_sub(removed.size_bytes(), Ordering::AcqRel);
                    self.policy.on_remove(key);
                }
            }
        }
    }

    /// Inserts or replaces `key` with `entry`, evicting victims as needed
    /// to stay within `budget_bytes`. Memory accounting is updated by the
    /// exact delta between the new and any replaced entry's `size_bytes` —
    /// not by the new entry's full size — which avoids double-counting a
    /// replacement's old footprint.
    pub fn put(&self, key: String, entry: Entry) {
        let mut table = self.table.write();
        let existing_size = table.get(&key).map(Entry::size_bytes).unwrap_or(0);
        // Signed delta: may be negative when a replacement shrinks the
        // value. Using this delta (rather than `entry.size_bytes()`) to
        // update `memory_used` is what closes the double-accounting bug
        // naive ports of the put path are prone to.
        let delta = entry.size_bytes() as i64 - existing_size as i64;

        // `key` is excluded from victim selection: on a replacing put its
        // old entry is still sitting in `table` at this point, and if it
        // were evicted here `memory_used` would be debited for it twice —
        // once by the eviction, once by `delta` below, which already
        // accounts for the old entry going away.
        while self.memory_used.load(Ordering::Acquire) as i64 + delta > self.budget_bytes as i64
            && !table.is_empty()
        {
            if !Self::evict_one_locked(&self.policy, &mut table, &self.memory_used, &self.evictions, Some(&key))
            {
                break;
            }
        }

        let is_replacement = table.contains_key(&key);
        if is_replacement {
            self.policy.on_remove(&key);
        }
        table.insert(key.clone(), entry);
        self.policy.on_insert(&key, table.get(&key).expect("just inserted"));

        if delta >= 0 {
            self.memory_used.fetch_add(delta as u64, Ordering::AcqRel);
        } else {
            self.memory_used.fetch_sub((-delta) as u64, Ordering::AcqRel);
        }
    }

    /// Removes `key` unconditionally. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut table = self.table.write();
        if let Some(removed) = table.shift_remove(key) {
            self.memory_used
                .fetch_sub(removed.size_bytes(), Ordering::AcqRel);
            self.policy.on_remove(key);
            true
        } else {
            false
        }
    }

    /// Drops every entry and resets `memory_used` to zero.
    pub fn clear(&self) {
        let mut table = self.table.write();
        table.clear();
        self.memory_used.store(0, Ordering::Release);
    }

    /// Rewrites the TTL of `key` if present. Requires the write lock since
    /// it is a control operation, not a hot-path read.
    pub fn set_ttl(&self, key: &str, seconds: u64) -> bool {
        let table = self.table.write();
        if let Some(entry) = table.get(key) {
            entry.set_ttl(seconds);
            true
        } else {
            false
        }
    }

    /// Remaining TTL in seconds for `key`: `Some(seconds)` if present with a
    /// TTL, `None` if present with no TTL, or absent entirely.
    pub fn ttl(&self, key: &str) -> Option<Option<i64>> {
        let now = now_wall_ms();
        let table = self.table.read();
        table.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.ttl_remaining_s(now))
            }
        })
    }

    /// Reads the raw entry's metadata snapshot without affecting access
    /// bookkeeping. Used by the adaptive TTL controller's sweep.
    pub fn with_entry<R>(&self, key: &str, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        let table = self.table.read();
        table.get(key).map(f)
    }

    /// Whether `key` is present and unexpired.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = now_wall_ms();
        let table = self.table.read();
        table.get(key).is_some_and(|entry| !entry.is_expired(now))
    }

    /// Snapshot of all live keys (weakly consistent: a concurrent put or
    /// delete may or may not be reflected).
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = now_wall_ms();
        let table = self.table.read();
        table
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Removes every expired entry. Called by the store's background sweep
    /// under this segment's write lock only, never blocking other
    /// segments.
    pub fn sweep_expired(&self) -> usize {
        let now = now_wall_ms();
        let mut table = self.table.write();
        let expired: Vec<String> = table
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            if let Some(removed) = table.shift_remove(key) {
                self.memory_used
                    .fetch_sub(removed.size_bytes(), Ordering::AcqRel);
                self.policy.on_remove(key);
            }
        }
        expired.len()
    }

    /// Point-in-time counters for this segment.
    #[must_use]
    pub fn stats(&self) -> SegmentStats {
        SegmentStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            memory_used: self.memory_used(),
            entry_count: self.table.read().len(),
        }
    }

    /// Selects and removes one victim under the already-held write lock.
    /// `exclude` keeps a replacing `put`'s own key out of victim selection
    /// (see the comment in `put`). Returns whether a victim was found
    /// (callers loop until the budget condition clears or the table
    /// empties).
    fn evict_one_locked(
        policy: &EvictionPolicy,
        table: &mut IndexMap<String, Entry>,
        memory_used: &AtomicU64,
        evictions: &AtomicU64,
        exclude: Option<&str>,
    ) -> bool {
        let Some(victim) = policy.select_victim(table, exclude) else {
            return false;
        };
        if let Some(removed) = table.shift_remove(&victim) {
            memory_used.fetch_sub(removed.size_bytes(), Ordering::AcqRel);
            policy.on_remove(&victim);
            evictions.fetch_add(1, Ordering::Relaxed);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionKind;

    fn segment(budget: u64) -> Segment {
        Segment::new(budget, EvictionPolicy::from_kind(EvictionKind::Lru))
    }

    #[test]
    fn basic_round_trip() {
        let seg = segment(1024 * 1024);
        seg.put("user:1".to_string(), Entry::new(b"Alice".to_vec(), 0, 56, 0));
        assert_eq!(seg.get("user:1"), Some(b"Alice".to_vec()));
        assert!(seg.delete("user:1"));
        assert_eq!(seg.get("user:1"), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let seg = segment(1024);
        seg.put("k".to_string(), Entry::new(b"v".to_vec(), 0, 56, 0));
        assert!(seg.delete("k"));
        assert!(!seg.delete("k"));
    }

    #[test]
    fn memory_used_matches_sum_of_sizes() {
        let seg = segment(100_000);
        for i in 0..5 {
            seg.put(format!("k{i}"), Entry::new(vec![0u8; 100], 0, 56, 0));
        }
        assert_eq!(seg.memory_used(), 5 * (56 + 100));
        assert_eq!(seg.stats().entry_count, 5);
    }

    #[test]
    fn replacement_updates_memory_by_delta_not_by_full_size() {
        let seg = segment(100_000);
        seg.put("k".to_string(), Entry::new(vec![0u8; 100], 0, 56, 0));
        let after_insert = seg.memory_used();
        seg.put("k".to_string(), Entry::new(vec![0u8; 50], 0, 56, 0));
        assert_eq!(seg.memory_used(), 56 + 50);
        assert!(seg.memory_used() < after_insert);
    }

    #[test]
    fn replacing_put_never_evicts_its_own_key() {
        // "a" is the LRU victim candidate (untouched, inserted first); "b"
        // is touched so it's MRU. Growing "a" enough to require an
        // eviction must evict "b", not "a" itself — evicting "a" here
        // would double-subtract its old size once via the eviction and
        // once via the replacement delta, leaving memory_used short of
        // the table's actual contents (I1).
        let seg = segment(200);
        seg.put("a".to_string(), Entry::new(vec![0u8; 10], 0, 56, 0));
        seg.put("b".to_string(), Entry::new(vec![0u8; 10], 0, 56, 0));
        seg.get("b"); // touch b so it's no longer the LRU candidate

        seg.put("a".to_string(), Entry::new(vec![0u8; 150], 0, 56, 0));

        assert_eq!(seg.get("a").map(|v| v.len()), Some(150), "a must survive its own replacing put");
        assert_eq!(seg.get("b"), None, "b, not a, should have been evicted");
        assert_eq!(seg.memory_used(), 56 + 150, "memory_used must match the table's actual contents");
    }

    #[test]
    fn eviction_under_memory_pressure_matches_scenario_3() {
        // Budget 2000 B, overhead 120, 10 entries of 300-byte values
        // (size_bytes = 420 each). After inserting k0..k9 in order, k0..k4
        // are evicted, k5..k9 remain, memory_used <= 2000.
        let seg = segment(2000);
        for i in 0..10 {
            seg.put(format!("k{i}"), Entry::new(vec![0u8; 300], 0, 120, 0));
        }
        assert!(seg.memory_used() <= 2000);
        for i in 0..5 {
            assert_eq!(seg.get(&format!("k{i}")), None, "k{i} should have been evicted");
        }
        for i in 5..10 {
            assert!(seg.get(&format!("k{i}")).is_some(), "k{i} should remain");
        }
    }

    #[test]
    fn expiry_makes_get_return_none_and_ttl_minus_two() {
        let seg = segment(1024);
        seg.put("k".to_string(), Entry::new(b"v".to_vec(), 0, 56, 0));
        seg.set_ttl("k", 1);
        assert!(seg.ttl("k").is_some());
        let entry_expiry = seg.with_entry("k", |e| e.expires_at_wall()).unwrap();
        // simulate future observation past expiry without sleeping in tests
        assert!(!seg.with_entry("k", |e| e.is_expired(entry_expiry)).unwrap());
        assert!(seg
            .with_entry("k", |e| e.is_expired(entry_expiry + 1))
            .unwrap());
    }

    #[test]
    fn clear_resets_memory_and_table() {
        let seg = segment(1024 * 1024);
        seg.put("a".to_string(), Entry::new(b"1".to_vec(), 0, 56, 0));
        seg.put("b".to_string(), Entry::new(b"2".to_vec(), 0, 56, 0));
        seg.clear();
        assert_eq!(seg.memory_used(), 0);
        assert_eq!(seg.stats().entry_count, 0);
    }

    #[test]
    fn single_oversized_entry_is_still_stored() {
        let seg = segment(10);
        seg.put("k".to_string(), Entry::new(vec![0u8; 1000], 0, 56, 0));
        assert!(seg.get("k").is_some());
    }
}
