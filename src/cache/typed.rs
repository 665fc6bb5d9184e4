//! Two-level (key, subtype) → value cache
//!
//! Same lazy, double-checked expiry as [`KeyedCache`](super::KeyedCache). Used
//! for links, where one path may have several cached variants depending on
//! who asked for it. Values implementing [`Evict`] can pin themselves in place
//! and are told when they leave the cache.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::trace;

use super::keyed::Entry;
use super::Evict;

type Variants<V> = HashMap<String, Entry<V>>;

/// (key, subtype) → value cache with per-entry TTL
pub struct TypedCache<V> {
    entries: RwLock<HashMap<String, Variants<V>>>,
    default_ttl: Option<Duration>,
}

impl<V: Clone + Evict> TypedCache<V> {
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn set_type(&self, key: impl Into<String>, typ: impl Into<String>, value: V) {
        self.insert(key.into(), typ.into(), Entry::new(value, self.default_ttl));
    }

    pub fn set_type_with_ttl(
        &self,
        key: impl Into<String>,
        typ: impl Into<String>,
        value: V,
        ttl: Duration,
    ) {
        self.insert(key.into(), typ.into(), Entry::new(value, Some(ttl)));
    }

    fn insert(&self, key: String, typ: String, entry: Entry<V>) {
        let replaced = self
            .entries
            .write()
            .entry(key)
            .or_default()
            .insert(typ, entry);
        if let Some(old) = replaced {
            old.value.evicted();
        }
    }

    pub fn get_type(&self, key: &str, typ: &str) -> Option<V> {
        {
            let entries = self.entries.read();
            let entry = entries.get(key)?.get(typ)?;
            if !Self::is_stale(entry, Instant::now()) {
                return Some(entry.value.clone());
            }
        }
        self.evict_stale(key, typ)
    }

    /// Expired and not pinned by an outstanding user
    fn is_stale(entry: &Entry<V>, now: Instant) -> bool {
        entry.is_expired(now) && !entry.value.is_pinned()
    }

    fn evict_stale(&self, key: &str, typ: &str) -> Option<V> {
        let evicted = {
            let mut entries = self.entries.write();
            let variants = entries.get_mut(key)?;
            let entry = variants.get(typ)?;
            if !Self::is_stale(entry, Instant::now()) {
                return Some(entry.value.clone());
            }
            trace!("typed cache entry expired: {} [{}]", key, typ);
            let evicted = variants.remove(typ);
            if variants.is_empty() {
                entries.remove(key);
            }
            evicted
        };
        if let Some(entry) = evicted {
            entry.value.evicted();
        }
        None
    }

    /// Remove one variant of a key
    pub fn delete_type(&self, key: &str, typ: &str) -> bool {
        self.delete_type_if(key, typ, |_| true)
    }

    /// Remove one variant of a key if the stored value still matches
    pub fn delete_type_if(&self, key: &str, typ: &str, matches: impl FnOnce(&V) -> bool) -> bool {
        let evicted = {
            let mut entries = self.entries.write();
            let Some(variants) = entries.get_mut(key) else {
                return false;
            };
            if !variants.get(typ).is_some_and(|entry| matches(&entry.value)) {
                return false;
            }
            let evicted = variants.remove(typ);
            if variants.is_empty() {
                entries.remove(key);
            }
            evicted
        };
        match evicted {
            Some(entry) => {
                entry.value.evicted();
                true
            }
            None => false,
        }
    }

    /// Remove every variant of a key
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.write().remove(key);
        match removed {
            Some(variants) => {
                for entry in variants.into_values() {
                    entry.value.evicted();
                }
                true
            }
            None => false,
        }
    }

    /// Remove every key equal to or under `prefix`, except keys under one of `keep`
    pub fn delete_prefix(&self, prefix: &str, keep: &[String]) -> usize {
        let removed: Vec<Variants<V>> = {
            let mut entries = self.entries.write();
            let keys: Vec<String> = entries
                .keys()
                .filter(|key| crate::path::owns(prefix, keep, key))
                .cloned()
                .collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };
        let count = removed.len();
        for entry in removed.into_iter().flat_map(|v| v.into_values()) {
            entry.value.evicted();
        }
        count
    }

    pub fn clear(&self) {
        let drained: Vec<Variants<V>> = self.entries.write().drain().map(|(_, v)| v).collect();
        for entry in drained.into_iter().flat_map(|v| v.into_values()) {
            entry.value.evicted();
        }
    }

    /// Number of keys with at least one stored variant
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
