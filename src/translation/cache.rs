//! Translation cache
//!
//! Strict LRU keyed by (trimmed source text, source language, target
//! language). The lock is held across the whole lookup-and-evict sequence so
//! concurrent ticks can never evict twice or lose an update.

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{BoundedCache, CacheStats};

/// Default number of cached translations
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TranslationKey {
    text: String,
    from: String,
    to: String,
}

impl TranslationKey {
    fn new(text: &str, from: &str, to: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Thread-safe LRU map from (text, from, to) to translated text
pub struct TranslationCache {
    inner: Mutex<BoundedCache<TranslationKey, String>>,
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BoundedCache::new(capacity)),
        }
    }

    /// Cached translation, refreshing its recency on hit
    pub fn get(&self, text: &str, from: &str, to: &str) -> Option<String> {
        let key = TranslationKey::new(text, from, to);
        self.inner.lock().get(&key).cloned()
    }

    /// Store a translation. Blank source or translated text is ignored.
    pub fn put(&self, text: &str, translated: &str, from: &str, to: &str) {
        if text.trim().is_empty() || translated.trim().is_empty() {
            debug!("Refusing to cache blank translation entry");
            return;
        }

        let key = TranslationKey::new(text, from, to);
        let mut cache = self.inner.lock();
        if let Some(evicted) = cache.insert(key, translated.to_string()) {
            debug!("Translation cache evicted '{}' ({}->{})", evicted.text, evicted.from, evicted.to);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}
