//! Eviction policies consulted by [`crate::segment::Segment`] when a put
//! would push `memory_used` over `budget_bytes`.
//!
//! The source modeled each policy as a class in a small hierarchy; here a
//! sum type carries the same four hook methods without runtime
//! subclassing. A future policy needing per-segment state would simply
//! grow its own variant.

use indexmap::IndexMap;

use crate::config::EvictionKind;
use crate::entry::Entry;

/// Strategy for selecting a victim key once a segment is over budget.
#[derive(Debug, Clone, Copy)]
pub enum EvictionPolicy {
    /// Evict the entry with the oldest `last_access_mono`.
    Lru,
    /// Evict the entry with the fewest accesses, tie-broken by the oldest
    /// `last_access_mono`.
    Lfu,
}

impl EvictionPolicy {
    /// Builds the runtime policy from its configuration discriminant.
    #[must_use]
    pub fn from_kind(kind: EvictionKind) -> Self {
        match kind {
            EvictionKind::Lru => Self::Lru,
            EvictionKind::Lfu => Self::Lfu,
        }
    }

    /// Selects the key to evict next, or `None` if the table is empty (or
    /// only contains `exclude`). `exclude` keeps a replacing `put`'s own key
    /// from being chosen as its own victim — the table still holds its old
    /// entry at selection time, and evicting it there would double-account
    /// against `memory_used` once the replacement's delta is applied. Both
    /// policies scan linearly; segments are kept small enough that this is
    /// acceptable.
    #[must_use]
    pub fn select_victim(&self, table: &IndexMap<String, Entry>, exclude: Option<&str>) -> Option<String> {
        let candidates = table.iter().filter(|(key, _)| exclude != Some(key.as_str()));
        match self {
            Self::Lru => candidates
                .min_by_key(|(_, entry)| entry.last_access_mono())
                .map(|(key, _)| key.clone()),
            Self::Lfu => candidates
                .min_by_key(|(_, entry)| (entry.access_count(), entry.last_access_mono()))
                .map(|(key, _)| key.clone()),
        }
    }

    /// Hook invoked after a successful read. Both policies are stateless;
    /// the entry's own atomics (updated via `touch()`) carry the signal
    /// each policy needs at victim-selection time.
    pub fn on_access(&self, _key: &str, _entry: &Entry) {}

    /// Hook invoked after an insert or replacement. Stateless for both
    /// current policies.
    pub fn on_insert(&self, _key: &str, _entry: &Entry) {}

    /// Hook invoked after a removal (explicit delete, eviction, or
    /// expiry). Stateless for both current policies.
    pub fn on_remove(&self, _key: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(entries: &[(&str, u64, u64)]) -> IndexMap<String, Entry> {
        let mut table = IndexMap::new();
        for (key, access_count, _last) in entries {
            let entry = Entry::new(b"v".to_vec(), 0, 56, 0);
            for _ in 0..*access_count {
                entry.touch();
            }
            table.insert((*key).to_string(), entry);
        }
        table
    }

    #[test]
    fn lru_picks_oldest_last_access() {
        let table = table_with(&[("a", 0, 0), ("b", 0, 0)]);
        // touch b to bump its last_access ahead of a
        table.get("b").unwrap().touch();
        let victim = EvictionPolicy::Lru.select_victim(&table, None);
        assert_eq!(victim, Some("a".to_string()));
    }

    #[test]
    fn lfu_picks_fewest_accesses() {
        let table = table_with(&[("a", 5, 0), ("b", 1, 0)]);
        let victim = EvictionPolicy::Lfu.select_victim(&table, None);
        assert_eq!(victim, Some("b".to_string()));
    }

    #[test]
    fn empty_table_has_no_victim() {
        let table: IndexMap<String, Entry> = IndexMap::new();
        assert!(EvictionPolicy::Lru.select_victim(&table, None).is_none());
        assert!(EvictionPolicy::Lfu.select_victim(&table, None).is_none());
    }

    #[test]
    fn excluded_key_is_never_selected() {
        let table = table_with(&[("a", 0, 0), ("b", 0, 0)]);
        let victim = EvictionPolicy::Lru.select_victim(&table, Some("a"));
        assert_eq!(victim, Some("b".to_string()));
    }

    #[test]
    fn excluding_the_only_key_leaves_no_victim() {
        let table = table_with(&[("a", 0, 0)]);
        assert!(EvictionPolicy::Lru.select_victim(&table, Some("a")).is_none());
    }
}
