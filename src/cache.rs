//! Time-bounded result cache.
//!
//! Entries expire `ttl` after insertion. Expiry is checked lazily when a key
//! is read; the map is additionally bounded by `capacity`, evicting expired
//! entries first and then the least recently used one. `purge_expired()` can
//! be driven from a periodic task to reclaim entries that are never read
//! again.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::SearchResult;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Normalized cache key: trimmed, lowercased query plus clamped limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    limit: usize,
}

impl CacheKey {
    /// Normalizes a query and limit into a key.
    pub fn new(query: &str, limit: usize) -> Self {
        Self {
            query: query.trim().to_lowercase(),
            limit,
        }
    }

    /// Normalized query.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Result limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[derive(Debug)]
struct CacheEntry {
    result: SearchResult,
    inserted_at: Instant,
    last_access: Instant,
}

/// In-memory TTL cache of search results.
#[derive(Debug)]
pub struct ResultCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl ResultCache {
    /// Creates a cache with the default TTL and capacity.
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    /// Creates a cache with an explicit TTL and capacity (at least one).
    pub fn with_settings(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the cached result for `key` if it has not expired.
    ///
    /// An expired entry is removed by this call.
    pub async fn get(&self, key: &CacheKey) -> Option<SearchResult> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get_mut(key) {
            None => return None,
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                entry.last_access = now;
                return Some(entry.result.clone());
            }
            Some(_) => {}
        }

        entries.remove(key);
        debug!("Cache entry for '{}' ({}) expired", key.query, key.limit);
        None
    }

    /// Stores `result` under `key`. Empty results are not cached.
    ///
    /// Returns whether the result was stored.
    pub async fn put(&self, key: CacheKey, result: SearchResult) -> bool {
        if result.count == 0 {
            return false;
        }

        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, e| now.duration_since(e.inserted_at) < ttl);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_access)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    debug!("Evicted cache entry for '{}' ({})", oldest.query, oldest.limit);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: now,
                last_access: now,
            },
        );
        true
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.inserted_at) < self.ttl);
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}
