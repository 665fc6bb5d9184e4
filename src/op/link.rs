use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{prepare, Dispatcher};
use crate::cache::{CacheManager, CachedLink};
use crate::error::{FsError, Result};
use crate::model::{GetArgs, Link, LinkArgs, Obj, RangeReader, ResourceRef};
use crate::storage::Storage;

/// Attempts at taking a reference before giving up on a link
const MAX_LINK_ATTEMPTS: usize = 3;

/// A resolved link, holding a reference on its resource for as long as it lives
#[derive(Debug)]
pub struct LinkHandle {
    pub obj: Obj,
    pub link: Link,
    guard: Option<ResourceRef>,
}

impl LinkHandle {
    /// Whether this handle keeps a live resource open
    pub fn is_referenced(&self) -> bool {
        self.guard.is_some()
    }

    /// Range reader of the backing resource, if the backend provided one
    pub fn reader(&self) -> Option<&Arc<dyn RangeReader>> {
        self.guard.as_ref().and_then(|guard| guard.resource().reader())
    }
}

impl Dispatcher {
    /// Resolve a download link for a file
    ///
    /// Links backed by a live resource come back with a reference already
    /// taken; dropping the handle releases it. If a cached resource is closed
    /// between lookup and acquisition the link is fetched again.
    pub async fn link(&self, storage: &Arc<Storage>, file_path: &str, args: &LinkArgs) -> Result<LinkHandle> {
        let file_path = prepare(storage, file_path)?;
        let file = self
            .get_obj(storage, &file_path, GetArgs::default())
            .await?;
        if file.is_dir {
            return Err(FsError::NotAFile(file_path));
        }

        let typ = storage.link_cache_mode().type_key(args);
        let key = CacheManager::key(storage, &file_path);
        for attempt in 1..=MAX_LINK_ATTEMPTS {
            if attempt > 2 {
                warn!("Link resource for {} closed again, attempt {}", key, attempt);
            }

            let cached = match self.cache.link(storage, &file_path, &typ) {
                Some(cached) => cached,
                None => {
                    self.fetch_link(storage, &file_path, &file, &typ, args)
                        .await?
                }
            };
            let Some(resource) = cached.link.resource.clone() else {
                return Ok(LinkHandle {
                    obj: cached.obj,
                    link: cached.link,
                    guard: None,
                });
            };
            match resource.acquire() {
                Some(guard) => {
                    return Ok(LinkHandle {
                        obj: cached.obj,
                        link: cached.link,
                        guard: Some(guard),
                    })
                }
                None => {
                    debug!("link resource for {} already closed, fetching again", key);
                    self.cache
                        .delete_link_resource(storage, &file_path, &typ, &resource);
                }
            }
        }
        Err(FsError::Backend(format!(
            "link resource for {} closed {} times in a row",
            key, MAX_LINK_ATTEMPTS
        )))
    }

    /// Resolve a link through the backend, coalesced per (file, subtype)
    async fn fetch_link(
        &self,
        storage: &Arc<Storage>,
        file_path: &str,
        file: &Obj,
        typ: &str,
        args: &LinkArgs,
    ) -> Result<CachedLink> {
        let key = format!("{}#{}", CacheManager::key(storage, file_path), typ);
        let this = self.clone();
        let storage = Arc::clone(storage);
        let file_path = file_path.to_string();
        let file = file.clone();
        let typ = typ.to_string();
        let args = args.clone();
        self.links
            .run(&key, move || async move {
                this.resolve_link(storage, file_path, file, typ, args).await
            })
            .await
    }

    async fn resolve_link(
        self,
        storage: Arc<Storage>,
        file_path: String,
        file: Obj,
        typ: String,
        args: LinkArgs,
    ) -> Result<CachedLink> {
        let key = CacheManager::key(&storage, &file_path);
        debug!("resolving link for {} from backend", key);
        let link = storage
            .driver()
            .link(&file, &args)
            .await
            .map_err(|e| e.context("link", &key))?;

        let cached = CachedLink { obj: file, link };
        if let Some(ttl) = self.link_ttl(&storage, &cached.link) {
            self.cache
                .set_link(&storage, &file_path, &typ, cached.clone(), ttl);
        }
        Ok(cached)
    }

    /// How long a freshly resolved link may be served from cache
    ///
    /// Resource-backed links are always cached so that their resource has an
    /// owner that eventually retires it. Plain links are cached only when the
    /// backend says how long they stay valid.
    fn link_ttl(&self, storage: &Storage, link: &Link) -> Option<Duration> {
        if link.requires_reference() {
            return Some(link.expiration.unwrap_or_else(|| {
                let config = storage.config();
                if config.caches_listings() {
                    Duration::from_secs(config.cache_expiration * 60)
                } else {
                    self.options.link_lease
                }
            }));
        }
        if storage.config().no_cache {
            return None;
        }
        link.expiration
    }
}
