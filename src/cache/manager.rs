//! Cache Manager: owns all caches and the primitives that keep them coherent

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::{DirectoryEntry, Evict, KeyedCache, TypedCache};
use crate::model::{Link, LinkResource, Obj, StorageDetails};
use crate::path;
use crate::storage::Storage;

/// How long user snapshots stay cached
const USER_TTL: Duration = Duration::from_secs(60 * 60);

/// A resolved link together with the object it was issued for
#[derive(Debug, Clone)]
pub struct CachedLink {
    pub obj: Obj,
    pub link: Link,
}

impl Evict for CachedLink {
    fn is_pinned(&self) -> bool {
        self.link
            .resource
            .as_ref()
            .is_some_and(|r| r.ref_count() > 0)
    }

    fn evicted(&self) {
        if let Some(resource) = &self.link.resource {
            resource.retire();
        }
    }
}

/// Snapshot of a user record owned by the external user store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    /// Root of the user's view of the namespace
    pub base_path: String,
    pub permission: u32,
    pub disabled: bool,
}

/// Owner of every cache instance
pub struct CacheManager {
    dirs: KeyedCache<Arc<DirectoryEntry>>,
    links: TypedCache<CachedLink>,
    users: KeyedCache<Arc<UserRecord>>,
    settings: KeyedCache<String>,
    details: KeyedCache<StorageDetails>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self {
            dirs: KeyedCache::new(None),
            links: TypedCache::new(None),
            users: KeyedCache::new(Some(USER_TTL)),
            settings: KeyedCache::new(None),
            details: KeyedCache::new(None),
        }
    }

    /// Canonical cache key: mount path joined with the cleaned path
    pub fn key(storage: &Storage, path: &str) -> String {
        path::join(storage.mount_path(), path)
    }

    fn listing_ttl(storage: &Storage) -> Option<Duration> {
        let config = storage.config();
        if config.caches_listings() {
            Some(Duration::from_secs(config.cache_expiration * 60))
        } else {
            None
        }
    }

    // ---- directories -----------------------------------------------------

    pub fn dir(&self, storage: &Storage, dir_path: &str) -> Option<Arc<DirectoryEntry>> {
        if !storage.config().caches_listings() {
            return None;
        }
        self.dirs.get(&Self::key(storage, dir_path))
    }

    /// Store a fresh backend listing, replacing any previous entry
    pub fn set_dir(
        &self,
        storage: &Storage,
        dir_path: &str,
        objs: Vec<Obj>,
    ) -> Option<Arc<DirectoryEntry>> {
        let ttl = Self::listing_ttl(storage)?;
        let entry = Arc::new(DirectoryEntry::new(objs));
        let key = Self::key(storage, dir_path);
        trace!("caching listing of {} ({} objects)", key, entry.len());
        self.dirs.set_with_ttl(key, Arc::clone(&entry), ttl);
        Some(entry)
    }

    pub fn delete_directory(&self, storage: &Storage, dir_path: &str) {
        self.dirs.delete(&Self::key(storage, dir_path));
    }

    /// Drop a directory entry and every cached entry beneath it
    ///
    /// Only subdirectories present in the popped listings are visited, so the
    /// cost is bounded by what was cached rather than by the backend tree.
    /// Expired listings are still walked: a live listing may sit beneath one.
    pub fn delete_directory_tree(&self, key: &str) {
        let mut pending = vec![key.to_string()];
        while let Some(key) = pending.pop() {
            let Some(entry) = self.dirs.take(&key) else {
                continue;
            };
            debug!("dropped cached directory {}", key);
            for obj in entry.objects() {
                let child = path::join(&key, &obj.name);
                if obj.is_dir {
                    pending.push(child);
                } else {
                    self.links.delete(&child);
                }
            }
        }
    }

    /// Record a created, renamed or replaced object in its directory's listing
    ///
    /// Files drop their cached links first; on rename both the old and the
    /// new name are dropped. Storages that do not cache listings only get the
    /// link invalidation.
    pub fn add_or_update_object(
        &self,
        storage: &Storage,
        dir_path: &str,
        old: Option<&Obj>,
        new: Obj,
    ) {
        if !new.is_dir {
            if let Some(old) = old.filter(|old| old.name != new.name) {
                self.links.delete(&Self::key(storage, &path::join(dir_path, &old.name)));
            }
            self.links.delete(&Self::key(storage, &path::join(dir_path, &new.name)));
        }
        if let Some(entry) = self.dir(storage, dir_path) {
            entry.update_object(old.map(|o| o.name.as_str()), new);
        }
    }

    /// Remove an object from its directory's listing
    pub fn remove_object(&self, storage: &Storage, dir_path: &str, obj: &Obj) {
        if !obj.is_dir {
            self.links.delete(&Self::key(storage, &path::join(dir_path, &obj.name)));
        }
        if let Some(entry) = self.dir(storage, dir_path) {
            entry.remove_object(&obj.name);
        }
    }

    // ---- links -----------------------------------------------------------

    pub fn link(&self, storage: &Storage, file_path: &str, typ: &str) -> Option<CachedLink> {
        self.links.get_type(&Self::key(storage, file_path), typ)
    }

    pub fn set_link(
        &self,
        storage: &Storage,
        file_path: &str,
        typ: &str,
        link: CachedLink,
        ttl: Duration,
    ) {
        self.links
            .set_type_with_ttl(Self::key(storage, file_path), typ, link, ttl);
    }

    /// Drop every cached variant of a file's link
    pub fn delete_link(&self, storage: &Storage, file_path: &str) {
        self.links.delete(&Self::key(storage, file_path));
    }

    pub fn delete_link_type(&self, storage: &Storage, file_path: &str, typ: &str) {
        self.links.delete_type(&Self::key(storage, file_path), typ);
    }

    /// Drop a cached link only if it is still backed by `resource`
    ///
    /// A concurrent caller may already have replaced the entry with a fresh
    /// link; that one must survive.
    pub fn delete_link_resource(
        &self,
        storage: &Storage,
        file_path: &str,
        typ: &str,
        resource: &Arc<LinkResource>,
    ) -> bool {
        self.links
            .delete_type_if(&Self::key(storage, file_path), typ, |cached| {
                cached
                    .link
                    .resource
                    .as_ref()
                    .is_some_and(|r| Arc::ptr_eq(r, resource))
            })
    }

    // ---- storage details -------------------------------------------------

    pub fn details(&self, storage: &Storage) -> Option<StorageDetails> {
        self.details.get(storage.mount_path())
    }

    pub fn set_details(&self, storage: &Storage, details: StorageDetails) {
        if let Some(ttl) = Self::listing_ttl(storage) {
            self.details
                .set_with_ttl(storage.mount_path().to_string(), details, ttl);
        }
    }

    // ---- users and settings ----------------------------------------------

    pub fn user(&self, username: &str) -> Option<Arc<UserRecord>> {
        self.users.get(username)
    }

    pub fn set_user(&self, user: UserRecord) {
        self.users.set(user.username.clone(), Arc::new(user));
    }

    pub fn delete_user(&self, username: &str) {
        self.users.delete(username);
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings.get(key)
    }

    pub fn set_setting(&self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.set(key, value.into());
    }

    pub fn delete_setting(&self, key: &str) {
        self.settings.delete(key);
    }

    // ---- teardown --------------------------------------------------------

    /// Drop everything cached for one storage
    ///
    /// `nested` lists the mount paths of other storages mounted beneath this
    /// one; their entries share the key space and are left alone.
    pub fn clear_storage(&self, storage: &Storage, nested: &[String]) {
        let mount = storage.mount_path();
        let dirs = self.dirs.delete_prefix(mount, nested);
        let links = self.links.delete_prefix(mount, nested);
        self.details.delete(mount);
        debug!(
            "cleared caches for {}: {} directories, {} links",
            mount, dirs, links
        );
    }

    pub fn clear(&self) {
        self.dirs.clear();
        self.links.clear();
        self.users.clear();
        self.settings.clear();
        self.details.clear();
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        // Retire any live link resources still held by the cache
        self.links.clear();
    }
}
