//! Capacity-bounded key/value store shared by the recognition and
//! translation caches.
//!
//! Recency order is kept by an [`lru::LruCache`], so lookups, inserts and
//! evictions are constant time. Entries also carry a logical `last_accessed`
//! stamp taken from a strictly increasing counter. Inserting into a full
//! store evicts exactly one entry, the least recently accessed one.
//!
//! The store itself is not synchronized; the caches built on top of it wrap
//! it in a lock and hold that lock across the whole read-modify-write.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// A cached value with its access stamp
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub last_accessed: u64,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Total number of lookups
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Least-recently-accessed eviction store
pub struct BoundedCache<K, V> {
    entries: LruCache<K, CacheEntry<V>>,
    clock: u64,
    stats: CacheStats,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash,
{
    /// Create a store holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up a value, refreshing its recency on hit
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let stamp = self.tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = stamp;
                self.stats.hits += 1;
                Some(&entry.value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up a value without touching recency or counters
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key).map(|e| &e.value)
    }

    /// Access stamp of an entry, without touching recency
    pub fn last_accessed(&self, key: &K) -> Option<u64> {
        self.entries.peek(key).map(|e| e.last_accessed)
    }

    /// Insert or replace a value. Returns the evicted key, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        let stamp = self.tick();

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.last_accessed = stamp;
            return None;
        }

        // The key is absent, so anything handed back was evicted
        let evicted = self
            .entries
            .push(
                key,
                CacheEntry {
                    value,
                    last_accessed: stamp,
                },
            )
            .map(|(old, _)| old);
        if evicted.is_some() {
            self.stats.evictions += 1;
        }
        evicted
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
