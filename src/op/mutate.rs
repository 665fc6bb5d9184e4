use std::sync::Arc;
use std::time::SystemTime;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info};

use super::{check_name, prepare, with_default_path, Dispatcher};
use crate::cache::CacheManager;
use crate::driver::Variant;
use crate::error::{FsError, Result};
use crate::model::{GetArgs, Obj};
use crate::path;
use crate::storage::Storage;

impl Dispatcher {
    /// Create a directory and any missing parents
    ///
    /// Succeeds without a backend call if the directory already exists.
    pub async fn make_dir(&self, storage: &Arc<Storage>, dir_path: &str) -> Result<()> {
        let dir_path = prepare(storage, dir_path)?;
        self.make_dir_all(storage, &dir_path).await
    }

    pub(super) fn make_dir_all<'a>(
        &'a self,
        storage: &'a Arc<Storage>,
        dir_path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            match self.get_obj(storage, dir_path, GetArgs::default()).await {
                Ok(obj) if obj.is_dir => return Ok(()),
                Ok(_) => return Err(FsError::NotAFolder(dir_path.to_string())),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }

            let (parent_path, name) = path::split(dir_path);
            self.make_dir_all(storage, &parent_path).await?;
            let parent = self
                .get_obj(storage, &parent_path, GetArgs::default())
                .await?;

            let key = CacheManager::key(storage, dir_path);
            let driver = storage.driver();
            let created = match storage.capabilities().make_dir {
                Variant::ReturnsObject => {
                    let obj = driver
                        .make_dir_obj(&parent, &name)
                        .await
                        .map_err(|e| e.context("make dir", &key))?;
                    with_default_path(obj, dir_path)
                }
                Variant::Plain => {
                    driver
                        .make_dir(&parent, &name)
                        .await
                        .map_err(|e| e.context("make dir", &key))?;
                    Obj::directory(name, SystemTime::now())
                        .with_path(dir_path)
                        .into_temp()
                }
                Variant::Absent => return Err(FsError::NotImplemented),
            };
            debug!("created directory {}", key);

            self.cache
                .add_or_update_object(storage, &parent_path, None, created.clone());
            self.notify(storage, &parent_path, vec![created]);
            Ok(())
        }
        .boxed()
    }

    /// Move an object into another directory
    pub async fn move_obj(&self, storage: &Arc<Storage>, src_path: &str, dst_dir_path: &str) -> Result<()> {
        let src_path = prepare(storage, src_path)?;
        let dst_dir_path = path::normalize(dst_dir_path);
        check_not_into_itself(&src_path, &dst_dir_path)?;

        let src = self.get_obj(storage, &src_path, GetArgs::default()).await?;
        let dst_dir = self.require_dir(storage, &dst_dir_path).await?;
        let (src_dir_path, _) = path::split(&src_path);
        let moved_path = path::join(&dst_dir_path, &src.name);

        let key = CacheManager::key(storage, &src_path);
        let driver = storage.driver();
        let moved = match storage.capabilities().move_to {
            Variant::ReturnsObject => {
                let obj = driver
                    .move_to_obj(&src, &dst_dir)
                    .await
                    .map_err(|e| e.context("move", &key))?;
                with_default_path(obj, &moved_path)
            }
            Variant::Plain => {
                driver
                    .move_to(&src, &dst_dir)
                    .await
                    .map_err(|e| e.context("move", &key))?;
                src.clone().with_path(moved_path.as_str()).into_temp()
            }
            Variant::Absent => return Err(FsError::NotImplemented),
        };
        info!("moved {} to {}", key, CacheManager::key(storage, &dst_dir_path));

        self.cache.remove_object(storage, &src_dir_path, &src);
        if src.is_dir {
            self.cache
                .delete_directory_tree(&CacheManager::key(storage, &src_path));
            self.cache
                .delete_directory_tree(&CacheManager::key(storage, &moved_path));
            self.relist.schedule(self, storage, &moved_path);
        }
        self.cache
            .add_or_update_object(storage, &dst_dir_path, None, moved.clone());

        self.notify(storage, &src_dir_path, Vec::new());
        self.notify(storage, &dst_dir_path, vec![moved]);
        Ok(())
    }

    /// Rename an object within its directory
    pub async fn rename(&self, storage: &Arc<Storage>, src_path: &str, new_name: &str) -> Result<()> {
        let src_path = prepare(storage, src_path)?;
        check_name(new_name)?;
        if src_path == "/" {
            return Err(FsError::NotSupported("cannot rename the storage root".to_string()));
        }

        let src = self.get_obj(storage, &src_path, GetArgs::default()).await?;
        if src.name == new_name {
            return Ok(());
        }
        let (dir_path, _) = path::split(&src_path);
        let new_path = path::join(&dir_path, new_name);

        let key = CacheManager::key(storage, &src_path);
        let driver = storage.driver();
        let renamed = match storage.capabilities().rename {
            Variant::ReturnsObject => {
                let obj = driver
                    .rename_obj(&src, new_name)
                    .await
                    .map_err(|e| e.context("rename", &key))?;
                with_default_path(obj, &new_path)
            }
            Variant::Plain => {
                driver
                    .rename(&src, new_name)
                    .await
                    .map_err(|e| e.context("rename", &key))?;
                Obj {
                    name: new_name.to_string(),
                    path: new_path.clone(),
                    ..src.clone()
                }
                .into_temp()
            }
            Variant::Absent => return Err(FsError::NotImplemented),
        };
        info!("renamed {} to {}", key, new_name);

        if src.is_dir {
            self.cache
                .delete_directory_tree(&CacheManager::key(storage, &src_path));
            self.cache
                .delete_directory_tree(&CacheManager::key(storage, &new_path));
        }
        self.cache
            .add_or_update_object(storage, &dir_path, Some(&src), renamed.clone());
        self.notify(storage, &dir_path, vec![renamed]);
        Ok(())
    }

    /// Copy an object into another directory
    pub async fn copy(&self, storage: &Arc<Storage>, src_path: &str, dst_dir_path: &str) -> Result<()> {
        let src_path = prepare(storage, src_path)?;
        let dst_dir_path = path::normalize(dst_dir_path);
        check_not_into_itself(&src_path, &dst_dir_path)?;

        let src = self.get_obj(storage, &src_path, GetArgs::default()).await?;
        let dst_dir = self.require_dir(storage, &dst_dir_path).await?;
        let copied_path = path::join(&dst_dir_path, &src.name);

        let key = CacheManager::key(storage, &src_path);
        let driver = storage.driver();
        let copied = match storage.capabilities().copy_to {
            Variant::ReturnsObject => {
                let obj = driver
                    .copy_to_obj(&src, &dst_dir)
                    .await
                    .map_err(|e| e.context("copy", &key))?;
                with_default_path(obj, &copied_path)
            }
            Variant::Plain => {
                driver
                    .copy_to(&src, &dst_dir)
                    .await
                    .map_err(|e| e.context("copy", &key))?;
                Obj {
                    id: None,
                    path: copied_path.clone(),
                    ..src.clone()
                }
                .into_temp()
            }
            Variant::Absent => return Err(FsError::NotImplemented),
        };
        info!("copied {} to {}", key, CacheManager::key(storage, &dst_dir_path));

        if src.is_dir {
            self.cache
                .delete_directory_tree(&CacheManager::key(storage, &copied_path));
            self.relist.schedule(self, storage, &copied_path);
        }
        self.cache
            .add_or_update_object(storage, &dst_dir_path, None, copied.clone());
        self.notify(storage, &dst_dir_path, vec![copied]);
        Ok(())
    }

    /// Remove an object; removing something that does not exist succeeds
    pub async fn remove(&self, storage: &Arc<Storage>, obj_path: &str) -> Result<()> {
        let obj_path = prepare(storage, obj_path)?;
        if obj_path == "/" {
            return Err(FsError::NotSupported("cannot remove the storage root".to_string()));
        }

        let obj = match self.get_obj(storage, &obj_path, GetArgs::default()).await {
            Ok(obj) => obj,
            Err(e) if e.is_not_found() => {
                debug!("{} does not exist, nothing to remove", obj_path);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !storage.capabilities().remove {
            return Err(FsError::NotImplemented);
        }

        let key = CacheManager::key(storage, &obj_path);
        storage
            .driver()
            .remove(&obj)
            .await
            .map_err(|e| e.context("remove", &key))?;
        info!("removed {}", key);

        let (dir_path, _) = path::split(&obj_path);
        self.cache.remove_object(storage, &dir_path, &obj);
        if obj.is_dir {
            self.cache.delete_directory_tree(&key);
        }
        self.notify(storage, &dir_path, Vec::new());
        Ok(())
    }

    /// Resolve a destination that must be an existing directory
    async fn require_dir(&self, storage: &Arc<Storage>, dir_path: &str) -> Result<Obj> {
        let dir = self.get_obj(storage, dir_path, GetArgs::default()).await?;
        if !dir.is_dir {
            return Err(FsError::NotAFolder(dir_path.to_string()));
        }
        Ok(dir)
    }
}

/// A folder cannot be moved or copied into itself or its own subtree
fn check_not_into_itself(src_path: &str, dst_dir_path: &str) -> Result<()> {
    if path::is_ancestor(src_path, dst_dir_path) {
        return Err(FsError::InvalidPath(format!(
            "cannot place {} inside itself ({})",
            src_path, dst_dir_path
        )));
    }
    Ok(())
}
