//! Operation dispatcher
//!
//! One method per filesystem verb. Every verb follows the same shape:
//!
//! 1. refuse to touch a storage that declares itself unhealthy
//! 2. normalize the path
//! 3. serve from cache where possible, otherwise call exactly one variant of
//!    the backend verb (coalesced for listings and links)
//! 4. fold the result back into the caches, synthesizing `TEMP` placeholders
//!    when the backend only signalled success
//! 5. fire the update hooks in the background

mod link;
mod list;
mod mutate;
mod put;
mod relist;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Deserialize;

use crate::cache::{CacheManager, CachedLink};
use crate::coalesce::Group;
use crate::error::{FsError, Result};
use crate::hook::HookRegistry;
use crate::model::{Obj, StorageDetails};
use crate::path;
use crate::storage::Storage;

pub use link::LinkHandle;
pub use relist::RelistConfig;

use relist::Relister;

/// Lease given to reference-counted links that carry no expiration of their own
const DEFAULT_LINK_LEASE: Duration = Duration::from_secs(30 * 60);

fn default_link_lease() -> Duration {
    DEFAULT_LINK_LEASE
}

/// Dispatcher tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchOptions {
    /// Cache lifetime for links that hold a live resource but no expiration
    #[serde(default = "default_link_lease", with = "humantime_serde")]
    pub link_lease: Duration,

    /// Background re-listing after folder moves and copies
    #[serde(default)]
    pub relist: RelistConfig,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            link_lease: DEFAULT_LINK_LEASE,
            relist: RelistConfig::default(),
        }
    }
}

/// Entry point for every storage operation
///
/// Cheap to clone; clones share caches, coalescing groups and hooks.
#[derive(Clone)]
pub struct Dispatcher {
    cache: Arc<CacheManager>,
    hooks: Arc<HookRegistry>,
    lists: Arc<Group<Vec<Obj>>>,
    links: Arc<Group<CachedLink>>,
    details: Arc<Group<StorageDetails>>,
    relist: Arc<Relister>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(cache: Arc<CacheManager>, hooks: Arc<HookRegistry>, options: DispatchOptions) -> Self {
        Self {
            cache,
            hooks,
            lists: Arc::new(Group::new()),
            links: Arc::new(Group::new()),
            details: Arc::new(Group::new()),
            relist: Arc::new(Relister::new(options.relist.clone())),
            options,
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Storage space usage, cached per storage and coalesced
    pub async fn details(&self, storage: &Arc<Storage>) -> Result<StorageDetails> {
        storage.check_health()?;
        if let Some(details) = self.cache.details(storage) {
            return Ok(details);
        }
        if !storage.capabilities().details {
            return Err(FsError::NotImplemented);
        }

        let this = self.clone();
        let owned = Arc::clone(storage);
        self.details
            .run(storage.mount_path(), move || async move {
                let details = owned
                    .driver()
                    .details()
                    .await
                    .map_err(|e| e.context("get details of", owned.mount_path()))?;
                this.cache.set_details(&owned, details);
                Ok::<_, FsError>(details)
            })
            .await
    }

    /// Fire the update hooks for a directory touched by a mutation
    ///
    /// Subscribers receive the cached listing when there is one, otherwise the
    /// objects the mutation produced.
    fn notify(&self, storage: &Storage, dir_path: &str, changed: Vec<Obj>) {
        let objs = match self.cache.dir(storage, dir_path) {
            Some(entry) => entry.sorted_objects(&storage.config()),
            None => changed,
        };
        self.hooks
            .dispatch(&CacheManager::key(storage, dir_path), objs);
    }
}

/// Health gate and path normalization shared by every verb
fn prepare(storage: &Storage, raw_path: &str) -> Result<String> {
    storage.check_health()?;
    Ok(path::normalize(raw_path))
}

fn root_obj() -> Obj {
    Obj::directory("", SystemTime::UNIX_EPOCH).with_path("/")
}

/// Fill in the storage-relative path when a backend left it empty
fn with_default_path(obj: Obj, path: &str) -> Obj {
    if obj.path.is_empty() {
        obj.with_path(path)
    } else {
        obj
    }
}

/// Reject names that would escape their directory
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(FsError::InvalidPath(format!("invalid object name {:?}", name)));
    }
    Ok(())
}
