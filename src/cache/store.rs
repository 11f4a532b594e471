//! Bounded, time-expiring response store.
//!
//! [`CacheStore`] is the only structure shared across in-flight calls. It
//! holds at most `max_entries` entries, evicts the least-recently-used one
//! when full, and expires entries lazily: an entry past its TTL is
//! reported absent by [`get`](CacheStore::get) and removed on the spot.
//!
//! Strict LRU order and per-entry TTLs are part of the contract, so the
//! store is an [`lru::LruCache`] behind a mutex rather than an
//! admission-filtered cache. Critical sections are a single map operation.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::types::{GenerateResult, StreamEvent};

/// Configuration for the response cache.
///
/// ```rust
/// # use muninn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .ttl(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 1,000.
    pub max_entries: usize,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
    /// Delay before the first replayed event. Default: none.
    pub replay_initial_delay: Duration,
    /// Delay between replayed events. Default: none.
    pub replay_chunk_delay: Duration,
    /// Whether streams that ended in an `Error` event are stored. Default: true.
    pub cache_errors: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
            replay_initial_delay: Duration::ZERO,
            replay_chunk_delay: Duration::ZERO,
            cache_errors: true,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the replay timing for cached streams.
    pub fn replay_delays(mut self, initial: Duration, chunk: Duration) -> Self {
        self.replay_initial_delay = initial;
        self.replay_chunk_delay = chunk;
        self
    }

    /// Store (or skip) streams whose last event is an error.
    pub fn cache_errors(mut self, enabled: bool) -> Self {
        self.cache_errors = enabled;
        self
    }
}

/// A cached call outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResult {
    /// Completed non-streaming result.
    Generate(GenerateResult),
    /// Captured stream events in delivery order.
    ///
    /// `complete` is false when the capture was cut short (consumer
    /// dropped the stream); such entries replay exactly what was captured.
    Stream {
        events: Vec<StreamEvent>,
        complete: bool,
    },
}

/// One stored entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: CachedResult,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Whether the entry's TTL has elapsed at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Thread-safe LRU + TTL store keyed on canonical call keys.
pub struct CacheStore {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl CacheStore {
    /// Create a store holding at most `max_entries` entries (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Create a store sized from a [`CacheConfig`].
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries)
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an entry, refreshing its recency.
    ///
    /// Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut entries = self.lock();
        let expired = entries.get(key)?.is_expired_at(now);
        if expired {
            entries.pop(key);
            return None;
        }
        entries.peek(key).cloned()
    }

    /// Insert (or overwrite) an entry. Last writer wins.
    pub fn set(&self, key: impl Into<String>, value: CachedResult, ttl: Duration) {
        let key = key.into();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            inserted_at: Instant::now(),
            ttl,
        };
        self.lock().put(key, entry);
    }

    /// Remove an entry, returning it if present.
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.lock().pop(key)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Number of entries currently held (expired entries included until touched).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Whether `key` is present, without touching recency or expiring it.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.lock();
        f.debug_struct("CacheStore")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}
