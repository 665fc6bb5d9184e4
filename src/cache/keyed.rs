//! Single-level key → value cache with lazy expiry
//!
//! Entries are never swept by a timer. A `get` that observes an expired entry
//! under the read lock upgrades to the write lock and re-validates before
//! evicting: another caller may have replaced the entry in between, and that
//! fresh entry must survive.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::trace;

/// A cached value with its absolute expiry (`None` never expires)
#[derive(Debug, Clone)]
pub(crate) struct Entry<V> {
    pub(crate) value: V,
    pub(crate) expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    pub(crate) fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key → value cache with per-entry TTL
pub struct KeyedCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    default_ttl: Option<Duration>,
}

impl<V: Clone> KeyedCache<V> {
    /// Create a cache whose `set` uses `default_ttl` (`None` = no expiry)
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.insert(key.into(), Entry::new(value, self.default_ttl));
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.insert(key.into(), Entry::new(value, Some(ttl)));
    }

    fn insert(&self, key: String, entry: Entry<V>) {
        self.entries.write().insert(key, entry);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read();
            let entry = entries.get(key)?;
            if !entry.is_expired(Instant::now()) {
                return Some(entry.value.clone());
            }
        }
        self.evict_stale(key)
    }

    /// Slow path: re-check under the write lock and evict only if still stale
    ///
    /// Returns the entry if it was refreshed since the read lock was released.
    fn evict_stale(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.write();
        let entry = entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            trace!("cache entry expired: {}", key);
            entries.remove(key);
            None
        } else {
            Some(entry.value.clone())
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Atomically remove and return an entry, expired or not
    ///
    /// For walks that must visit everything cached beneath a key.
    pub fn take(&self, key: &str) -> Option<V> {
        self.entries.write().remove(key).map(|entry| entry.value)
    }

    /// Remove every entry whose key equals `prefix` or lies under it, except
    /// keys under one of `keep`
    pub fn delete_prefix(&self, prefix: &str, keep: &[String]) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !crate::path::owns(prefix, keep, key));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V: Clone> Default for KeyedCache<V> {
    fn default() -> Self {
        Self::new(None)
    }
}
