use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;

use super::{check_name, prepare, with_default_path, Dispatcher};
use crate::cache::CacheManager;
use crate::driver::Variant;
use crate::error::{FsError, Result};
use crate::model::{FileStream, GetArgs, Obj};
use crate::path;
use crate::storage::Storage;

impl Dispatcher {
    /// Upload a file into a directory, creating the directory if needed
    ///
    /// An existing file of the same name is replaced in the cached listing.
    pub async fn put(&self, storage: &Arc<Storage>, dst_dir_path: &str, file: FileStream) -> Result<Obj> {
        let dst_dir_path = prepare(storage, dst_dir_path)?;
        check_name(&file.name)?;
        let target_path = path::join(&dst_dir_path, &file.name);

        self.make_dir_all(storage, &dst_dir_path).await?;
        let existing = self.existing_file(storage, &target_path).await?;
        let dst_dir = self
            .get_obj(storage, &dst_dir_path, GetArgs::default())
            .await?;

        let key = CacheManager::key(storage, &target_path);
        let (name, size, modified) = (file.name.clone(), file.size, file.modified);
        let driver = storage.driver();
        let uploaded = match storage.capabilities().put {
            Variant::ReturnsObject => {
                let obj = driver
                    .put_obj(&dst_dir, file)
                    .await
                    .map_err(|e| e.context("put", &key))?;
                with_default_path(obj, &target_path)
            }
            Variant::Plain => {
                driver
                    .put(&dst_dir, file)
                    .await
                    .map_err(|e| e.context("put", &key))?;
                Obj::file(name, size, modified)
                    .with_path(target_path.as_str())
                    .into_temp()
            }
            Variant::Absent => return Err(FsError::NotImplemented),
        };
        info!("uploaded {} ({} bytes)", key, uploaded.size);

        self.cache.add_or_update_object(
            storage,
            &dst_dir_path,
            existing.as_ref(),
            uploaded.clone(),
        );
        self.notify(storage, &dst_dir_path, vec![uploaded.clone()]);
        Ok(uploaded)
    }

    /// Have the backend download `url` into a new file
    pub async fn put_url(&self, storage: &Arc<Storage>, dst_dir_path: &str, name: &str, url: &str) -> Result<Obj> {
        let dst_dir_path = prepare(storage, dst_dir_path)?;
        check_name(name)?;
        let target_path = path::join(&dst_dir_path, name);

        self.make_dir_all(storage, &dst_dir_path).await?;
        let existing = self.existing_file(storage, &target_path).await?;
        let dst_dir = self
            .get_obj(storage, &dst_dir_path, GetArgs::default())
            .await?;

        let key = CacheManager::key(storage, &target_path);
        let driver = storage.driver();
        let fetched = match storage.capabilities().put_url {
            Variant::ReturnsObject => {
                let obj = driver
                    .put_url_obj(&dst_dir, name, url)
                    .await
                    .map_err(|e| e.context("put url into", &key))?;
                with_default_path(obj, &target_path)
            }
            Variant::Plain => {
                driver
                    .put_url(&dst_dir, name, url)
                    .await
                    .map_err(|e| e.context("put url into", &key))?;
                Obj::file(name, 0, SystemTime::now())
                    .with_path(target_path.as_str())
                    .into_temp()
            }
            Variant::Absent => return Err(FsError::NotImplemented),
        };
        info!("fetched {} into {}", url, key);

        self.cache.add_or_update_object(
            storage,
            &dst_dir_path,
            existing.as_ref(),
            fetched.clone(),
        );
        self.notify(storage, &dst_dir_path, vec![fetched.clone()]);
        Ok(fetched)
    }

    /// The file currently at `file_path`, if any; a folder there is an error
    async fn existing_file(&self, storage: &Arc<Storage>, file_path: &str) -> Result<Option<Obj>> {
        match self.get_obj(storage, file_path, GetArgs::default()).await {
            Ok(obj) if obj.is_dir => Err(FsError::NotAFile(file_path.to_string())),
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
