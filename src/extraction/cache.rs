/*!
 * Token count caching.
 *
 * The splitter re-measures the same paragraphs, sentences and words while it
 * packs chunks, so short spans are counted once per encoding and reused.
 */

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use log::debug;

use super::tokenizer::TokenEncoding;

/// Spans longer than this (in bytes) are never cached
pub const MAX_CACHED_SPAN_BYTES: usize = 2048;

/// Upper bound on cached entries before the cache stops accepting new ones
pub const MAX_CACHE_ENTRIES: usize = 50_000;

/// Cache key combining the encoding and the measured text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    encoding: TokenEncoding,
    text: String,
}

/// Token count cache shared by all counters of a job
#[derive(Debug, Clone)]
pub struct TokenCountCache {
    /// Internal cache storage
    cache: Arc<RwLock<HashMap<CacheKey, usize>>>,

    /// Cache hit counter
    hits: Arc<RwLock<usize>>,

    /// Cache miss counter
    misses: Arc<RwLock<usize>>,

    /// Whether caching is enabled
    enabled: bool,
}

impl TokenCountCache {
    /// Create a new token count cache
    pub fn new(enabled: bool) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            hits: Arc::new(RwLock::new(0)),
            misses: Arc::new(RwLock::new(0)),
            enabled,
        }
    }

    /// Whether a span of this size is eligible for caching
    pub fn accepts(&self, text: &str) -> bool {
        self.enabled && text.len() <= MAX_CACHED_SPAN_BYTES
    }

    /// Get a cached count
    pub fn get(&self, encoding: TokenEncoding, text: &str) -> Option<usize> {
        if !self.accepts(text) {
            return None;
        }

        let key = CacheKey { encoding, text: text.to_string() };
        let cache = self.cache.read();

        match cache.get(&key) {
            Some(count) => {
                *self.hits.write() += 1;
                Some(*count)
            }
            None => {
                *self.misses.write() += 1;
                None
            }
        }
    }

    /// Store a count
    pub fn store(&self, encoding: TokenEncoding, text: &str, count: usize) {
        if !self.accepts(text) {
            return;
        }

        let mut cache = self.cache.write();
        if cache.len() >= MAX_CACHE_ENTRIES {
            return;
        }
        cache.insert(CacheKey { encoding, text: text.to_string() }, count);
    }

    /// Get cache statistics as (hits, misses, hit rate)
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = *self.hits.read();
        let misses = *self.misses.read();
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        (hits, misses, hit_rate)
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.cache.write().clear();
        *self.hits.write() = 0;
        *self.misses.write() = 0;

        debug!("Token count cache cleared");
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl Default for TokenCountCache {
    fn default() -> Self {
        Self::new(true)
    }
}
