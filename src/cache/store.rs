//! Per-domain entry storage.
//!
//! Entries live in an [`LruCache`] whose recency order is driven only by
//! writes: reads use `peek`, so the least-recently-used end is always the
//! oldest-fetched entry. Count-based eviction and age-based sweeping both pop
//! from that end.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// An immutable snapshot of a cached value and the instant it was fetched.
///
/// Cloning is cheap; readers hold their own clone, so eviction never pulls a
/// value out from under a reader.
pub struct CacheEntry<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

/// Key → entry map for one cache domain.
pub struct CacheStore<T> {
    entries: RwLock<LruCache<String, CacheEntry<T>>>,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(LruCache::unbounded()),
        }
    }

    /// Snapshot the entry for `key` without touching its eviction order.
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        rw_read(&self.entries, SOURCE, "get").peek(key).cloned()
    }

    /// Replace the entry for `key` wholesale, stamping it with the current
    /// instant.
    pub fn insert(&self, key: String, value: T) -> CacheEntry<T> {
        let mut entries = rw_write(&self.entries, SOURCE, "insert");
        // Stamped under the write lock so order in the map matches `fetched_at`.
        let entry = CacheEntry {
            value: Arc::new(value),
            fetched_at: Instant::now(),
        };
        entries.put(key, entry.clone());
        entry
    }

    /// Evictor: drop oldest-fetched entries until at most `max_entries` remain.
    /// Returns the evicted keys, oldest first.
    pub fn evict_to(&self, max_entries: usize) -> Vec<String> {
        let mut entries = rw_write(&self.entries, SOURCE, "evict_to");
        let mut evicted = Vec::new();
        while entries.len() > max_entries {
            match entries.pop_lru() {
                Some((key, _)) => evicted.push(key),
                None => break,
            }
        }
        evicted
    }

    /// Drop every entry whose age at `now` exceeds `max_age`. Returns the
    /// removed keys, oldest first.
    pub fn remove_older_than(&self, max_age: Duration, now: Instant) -> Vec<String> {
        let mut entries = rw_write(&self.entries, SOURCE, "remove_older_than");
        let mut removed = Vec::new();
        while entries
            .peek_lru()
            .is_some_and(|(_, entry)| entry.age_at(now) > max_age)
        {
            if let Some((key, _)) = entries.pop_lru() {
                removed.push(key);
            }
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn insert_then_get_returns_snapshot() {
        let store = CacheStore::new();
        assert!(store.get("a").is_none());

        let written = store.insert("a".to_string(), 7_u32);
        let read = store.get("a").expect("entry present");

        assert_eq!(**read.value(), 7);
        assert_eq!(read.fetched_at(), written.fetched_at());
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_replaces_value_and_timestamp() {
        let store = CacheStore::new();
        let first = store.insert("a".to_string(), 1_u32);
        tokio::time::advance(Duration::from_millis(250)).await;
        let second = store.insert("a".to_string(), 2_u32);

        let read = store.get("a").expect("entry present");
        assert_eq!(**read.value(), 2);
        assert!(second.fetched_at() > first.fetched_at());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_removes_oldest_fetched_first() {
        let store = CacheStore::new();
        for key in ["a", "b", "c", "d"] {
            store.insert(key.to_string(), ());
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        let evicted = store.evict_to(3);

        assert_eq!(evicted, vec!["a".to_string()]);
        assert!(!store.contains("a"));
        for key in ["b", "c", "d"] {
            assert!(store.contains(key), "{key} should survive");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_protect_entries_from_eviction() {
        let store = CacheStore::new();
        store.insert("a".to_string(), ());
        store.insert("b".to_string(), ());

        // Reading "a" must not make it younger than "b".
        assert!(store.get("a").is_some());
        store.insert("c".to_string(), ());
        store.evict_to(2);

        assert!(!store.contains("a"));
        assert!(store.contains("b"));
        assert!(store.contains("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_entry_moves_to_young_end() {
        let store = CacheStore::new();
        store.insert("a".to_string(), 1);
        store.insert("b".to_string(), 1);
        store.insert("a".to_string(), 2);
        store.insert("c".to_string(), 1);

        assert_eq!(store.evict_to(2), vec!["b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_older_than_keeps_young_entries() {
        let store = CacheStore::new();
        store.insert("old".to_string(), ());
        tokio::time::advance(Duration::from_secs(10)).await;
        store.insert("young".to_string(), ());
        tokio::time::advance(Duration::from_secs(1)).await;

        let removed = store.remove_older_than(Duration::from_secs(5), Instant::now());

        assert_eq!(removed, vec!["old".to_string()]);
        assert!(store.contains("young"));
    }

    #[tokio::test(start_paused = true)]
    async fn store_recovers_from_poisoned_lock() {
        let store = CacheStore::new();
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("lock acquired");
            panic!("poison the store");
        }));

        store.insert("a".to_string(), 1_u8);
        assert!(store.get("a").is_some());
    }
}
