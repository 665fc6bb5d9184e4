use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, trace};

use super::{prepare, root_obj, with_default_path, Dispatcher};
use crate::cache::{sort_objects, CacheManager};
use crate::error::{FsError, Result};
use crate::model::{GetArgs, ListArgs, Obj};
use crate::path;
use crate::storage::Storage;

/// Predicate a caller applies to a listing shared with other callers
pub(super) type Want<'a> = &'a (dyn Fn(&Vec<Obj>) -> bool + Sync);

impl Dispatcher {
    /// List a directory, serving from cache unless `refresh` is set
    pub async fn list(&self, storage: &Arc<Storage>, dir_path: &str, args: ListArgs) -> Result<Vec<Obj>> {
        let dir_path = prepare(storage, dir_path)?;
        self.list_dir(storage, &dir_path, args, None).await
    }

    /// Resolve a single object
    ///
    /// Served from the parent's cached listing when possible. Otherwise the
    /// backend's own lookup is used if it has one, and the parent directory
    /// is listed as a last resort.
    pub async fn get(&self, storage: &Arc<Storage>, obj_path: &str, args: GetArgs) -> Result<Obj> {
        let obj_path = prepare(storage, obj_path)?;
        self.get_obj(storage, &obj_path, args).await
    }

    pub(super) async fn list_dir(
        &self,
        storage: &Arc<Storage>,
        dir_path: &str,
        args: ListArgs,
        want: Option<Want<'_>>,
    ) -> Result<Vec<Obj>> {
        let config = storage.config();
        let key = CacheManager::key(storage, dir_path);

        if !args.refresh {
            if let Some(entry) = self.cache.dir(storage, dir_path) {
                trace!("list cache hit: {}", key);
                return Ok(entry.sorted_objects(&config));
            }
        }

        let dir = self.dir_obj(storage, dir_path)?;
        let fetch = {
            let this = self.clone();
            let storage = Arc::clone(storage);
            let dir_path = dir_path.to_string();
            move || {
                let this = this.clone();
                let storage = Arc::clone(&storage);
                let dir = dir.clone();
                let dir_path = dir_path.clone();
                async move { this.fetch_listing(storage, dir, dir_path, args).await }
            }
        };
        let objs = match want {
            Some(want) => self.lists.run_validated(&key, fetch, want).await?,
            None => self.lists.run(&key, fetch).await?,
        };

        Ok(match self.cache.dir(storage, dir_path) {
            Some(entry) => entry.sorted_objects(&config),
            None => {
                let mut objs = objs;
                sort_objects(&mut objs, &config);
                objs
            }
        })
    }

    /// The one backend listing shared by every caller of a coalesced list
    async fn fetch_listing(
        self,
        storage: Arc<Storage>,
        dir: Obj,
        dir_path: String,
        args: ListArgs,
    ) -> Result<Vec<Obj>> {
        let key = CacheManager::key(&storage, &dir_path);
        debug!("listing {} from backend", key);
        let objs: Vec<Obj> = storage
            .driver()
            .list(&dir, &args)
            .await
            .map_err(|e| e.context("list", &key))?
            .into_iter()
            .map(|obj| {
                let obj_path = path::join(&dir_path, &obj.name);
                with_default_path(obj, &obj_path)
            })
            .collect();

        self.cache.set_dir(&storage, &dir_path, objs.clone());
        self.hooks.dispatch(&key, objs.clone());
        Ok(objs)
    }

    pub(super) async fn get_obj(&self, storage: &Arc<Storage>, obj_path: &str, args: GetArgs) -> Result<Obj> {
        if obj_path == "/" {
            return Ok(root_obj());
        }
        let (dir_path, name) = path::split(obj_path);
        let acceptable = |obj: &Obj| obj.name == name && !(args.no_temp && obj.is_temp());

        let mut refresh = false;
        if let Some(entry) = self.cache.dir(storage, &dir_path) {
            if let Some(obj) = entry.find(&name) {
                if acceptable(&obj) {
                    trace!("get cache hit: {}", obj_path);
                    return Ok(obj);
                }
                debug!("{} is a placeholder, re-listing {}", obj_path, dir_path);
                refresh = true;
            }
        }

        if storage.capabilities().get {
            match storage.driver().get(obj_path).await {
                Ok(obj) => return Ok(with_default_path(obj, obj_path)),
                Err(e) if e.is_not_implemented() => {}
                Err(e) => return Err(e.context("get", &CacheManager::key(storage, obj_path))),
            }
        }

        let want: Want<'_> = &|objs: &Vec<Obj>| objs.iter().any(&acceptable);
        let args = ListArgs {
            refresh,
            ..Default::default()
        };
        self.list_dir(storage, &dir_path, args, Some(want))
            .await?
            .into_iter()
            .find(|obj| obj.name == name)
            .ok_or_else(|| FsError::NotFound(obj_path.to_string()))
    }

    /// Directory object handed to the backend's list
    ///
    /// Taken from the parent's cached listing when present, otherwise
    /// synthesized from the path so a cold lookup costs a single listing.
    pub(super) fn dir_obj(&self, storage: &Storage, dir_path: &str) -> Result<Obj> {
        if dir_path == "/" {
            return Ok(root_obj());
        }
        let (parent, name) = path::split(dir_path);
        match self.cache.dir(storage, &parent).and_then(|entry| entry.find(&name)) {
            Some(obj) if obj.is_dir => Ok(obj),
            Some(_) => Err(FsError::NotAFolder(dir_path.to_string())),
            None => Ok(Obj::directory(name, SystemTime::UNIX_EPOCH).with_path(dir_path)),
        }
    }
}
