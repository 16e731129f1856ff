//! Thread-safe TTL + LRU cache for API responses
//!
//! Entries carry their own TTL, so one cache instance can hold profile
//! lookups with the default lifetime next to avatar URLs cached for longer.
//! Expiry is lazy: an expired entry is removed when a lookup touches it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::trace;

use super::config::CacheConfig;
use crate::resilience::{Clock, SystemClock};

/// Entry stored in the cache with expiry and recency metadata.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Internal storage for cache entries
#[derive(Debug)]
struct CacheStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    entries: HashMap<K, CacheEntry<V>>,
    /// Tracks recency for LRU eviction, least recent first.
    access_order: Vec<K>,
}

impl<K, V> CacheStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self { entries: HashMap::new(), access_order: Vec::new() }
    }

    fn touch(&mut self, key: &K) {
        self.access_order.retain(|k| k != key);
        self.access_order.push(key.clone());
    }
}

/// Generic thread-safe cache with per-entry TTL and LRU eviction.
///
/// Clones share the same underlying storage, so the cache can be handed to
/// multiple tasks cheaply.
///
/// # Type Parameters
/// - `K`: Key type (must be `Eq + Hash + Clone`)
/// - `V`: Value type (must be `Clone`)
/// - `C`: Clock type for expiry decisions (defaults to `SystemClock`)
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use rbx_users::cache::{Cache, CacheConfig};
///
/// let cache: Cache<String, i64> = Cache::new(CacheConfig::default());
/// cache.insert("user:1".to_string(), 42);
/// assert_eq!(cache.get(&"user:1".to_string()), Some(42));
/// ```
pub struct Cache<K, V, C = SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    storage: Arc<Mutex<CacheStorage<K, V>>>,
    config: CacheConfig,
    clock: C,
}

impl<K, V, C> Clone for Cache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<K, V> Cache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache with the given configuration using the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> Cache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    /// Create a new cache with a custom clock (useful for testing).
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self { storage: Arc::new(Mutex::new(CacheStorage::new())), config, clock }
    }

    /// Insert a value with the configured default TTL.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.config.default_ttl);
    }

    /// Insert a value with an explicit TTL, overriding the default.
    ///
    /// When the cache is at capacity and the key is new, the least recently
    /// accessed entry is evicted first.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut storage = self.lock();
        let capacity = self.config.capacity.max(1);

        if storage.entries.len() >= capacity && !storage.entries.contains_key(&key) {
            Self::evict_lru(&mut storage);
        }

        let now = self.clock.now();
        let entry = CacheEntry { value, inserted_at: now, last_accessed: now, ttl };
        storage.entries.insert(key.clone(), entry);
        storage.touch(&key);
    }

    /// Get a value from the cache.
    ///
    /// Returns `None` if the key is absent or the entry has expired. An
    /// expired entry is removed on the spot; a live hit refreshes its
    /// position in the recency order.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut storage = self.lock();
        let now = self.clock.now();

        let expired = storage.entries.get(key).is_some_and(|entry| entry.is_expired(now));
        if expired {
            trace!("removing expired cache entry");
            storage.entries.remove(key);
            storage.access_order.retain(|k| k != key);
            return None;
        }

        let value = match storage.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = now;
                entry.value.clone()
            }
            None => return None,
        };
        storage.touch(key);
        Some(value)
    }

    /// Bulk-insert entries with the default TTL.
    pub fn warm<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.insert(key, value);
        }
    }

    /// Remove a value from the cache, returning it if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut storage = self.lock();
        storage.access_order.retain(|k| k != key);
        storage.entries.remove(key).map(|entry| entry.value)
    }

    /// Clear all entries.
    pub fn clear(&self) {
        let mut storage = self.lock();
        storage.entries.clear();
        storage.access_order.clear();
    }

    /// Current number of entries, including any not yet lazily expired.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_lru(storage: &mut CacheStorage<K, V>) {
        if let Some(oldest) = storage.access_order.first().cloned() {
            trace!("evicting least recently used entry");
            storage.entries.remove(&oldest);
            storage.access_order.remove(0);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheStorage<K, V>> {
        // A poisoned cache mutex means a panic mid-update; the entry map is
        // still structurally valid, so recover the guard.
        self.storage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
