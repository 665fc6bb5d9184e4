//! Mounted storages and the mount table

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::cache::CacheManager;
use crate::driver::{Capabilities, Driver, LinkCacheMode, StorageConfig};
use crate::error::{FsError, Result};
use crate::path;

/// A driver mounted into the namespace
///
/// Capabilities are queried once here and reused for every call.
pub struct Storage {
    driver: Arc<dyn Driver>,
    capabilities: Capabilities,
    link_cache_mode: LinkCacheMode,
    mount_path: String,
}

impl Storage {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        let capabilities = driver.capabilities();
        let link_cache_mode = driver.link_cache_mode();
        let mount_path = path::normalize(&driver.config().mount_path);
        Self {
            driver,
            capabilities,
            link_cache_mode,
            mount_path,
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn link_cache_mode(&self) -> LinkCacheMode {
        self.link_cache_mode
    }

    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Current configuration and status reported by the driver
    pub fn config(&self) -> StorageConfig {
        self.driver.config()
    }

    /// Fail fast when the storage declares itself unhealthy
    pub fn check_health(&self) -> Result<()> {
        let config = self.config();
        if config.check_status && !config.status.is_working() {
            return Err(FsError::StorageUnavailable(
                self.mount_path.clone(),
                config.status.to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("mount_path", &self.mount_path)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Mount table - maps the unified namespace onto storages
pub struct StorageManager {
    storages: RwLock<Vec<Arc<Storage>>>,
    cache: Arc<CacheManager>,
}

impl StorageManager {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            storages: RwLock::new(Vec::new()),
            cache,
        }
    }

    /// Mount a driver at the mount path it declares
    pub fn register(&self, driver: Arc<dyn Driver>) -> Result<Arc<Storage>> {
        let storage = Arc::new(Storage::new(driver));
        let mut storages = self.storages.write();
        if storages
            .iter()
            .any(|s| s.mount_path() == storage.mount_path())
        {
            return Err(FsError::AlreadyExists(storage.mount_path().to_string()));
        }
        info!("Mounted storage at {}", storage.mount_path());
        storages.push(Arc::clone(&storage));
        Ok(storage)
    }

    /// Unmount a storage and drop everything cached for it
    pub fn unregister(&self, mount_path: &str) -> Result<()> {
        let mount_path = path::normalize(mount_path);
        let (storage, nested) = {
            let mut storages = self.storages.write();
            let pos = storages
                .iter()
                .position(|s| s.mount_path() == mount_path)
                .ok_or_else(|| FsError::NotFound(format!("No storage at {}", mount_path)))?;
            let storage = storages.remove(pos);
            let nested: Vec<String> = storages
                .iter()
                .map(|s| s.mount_path().to_string())
                .filter(|m| path::is_ancestor(&mount_path, m))
                .collect();
            (storage, nested)
        };
        self.cache.clear_storage(&storage, &nested);
        info!("Unmounted storage at {}", mount_path);
        Ok(())
    }

    /// Resolve a full path to its storage and the path within that storage
    ///
    /// The longest matching mount path wins.
    pub fn resolve(&self, full_path: &str) -> Result<(Arc<Storage>, String)> {
        let full_path = path::normalize(full_path);
        let storages = self.storages.read();
        let storage = storages
            .iter()
            .filter(|s| path::is_ancestor(s.mount_path(), &full_path))
            .max_by_key(|s| s.mount_path().len())
            .ok_or_else(|| FsError::NotFound(format!("No storage mounted for {}", full_path)))?;

        let actual = match storage.mount_path() {
            "/" => full_path.clone(),
            mount => path::normalize(&full_path[mount.len()..]),
        };
        Ok((Arc::clone(storage), actual))
    }

    pub fn get(&self, mount_path: &str) -> Option<Arc<Storage>> {
        let mount_path = path::normalize(mount_path);
        self.storages
            .read()
            .iter()
            .find(|s| s.mount_path() == mount_path)
            .cloned()
    }

    /// Get list of mount paths
    pub fn list_mounts(&self) -> Vec<String> {
        self.storages
            .read()
            .iter()
            .map(|s| s.mount_path().to_string())
            .collect()
    }

    /// Number of mounted storages
    pub fn count(&self) -> usize {
        self.storages.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StorageStatus;
    use crate::model::{Link, LinkArgs, ListArgs, Obj};
    use async_trait::async_trait;

    struct NullDriver {
        config: StorageConfig,
    }

    #[async_trait]
    impl Driver for NullDriver {
        fn config(&self) -> StorageConfig {
            self.config.clone()
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::read_only()
        }

        async fn list(&self, _dir: &Obj, _args: &ListArgs) -> Result<Vec<Obj>> {
            Ok(Vec::new())
        }

        async fn link(&self, _file: &Obj, _args: &LinkArgs) -> Result<Link> {
            Err(FsError::NotImplemented)
        }
    }

    fn driver(mount: &str) -> Arc<dyn Driver> {
        Arc::new(NullDriver {
            config: StorageConfig::new(mount),
        })
    }

    #[test]
    fn test_resolve_longest_prefix() {
        let manager = StorageManager::new(Arc::new(CacheManager::new()));
        manager.register(driver("/")).unwrap();
        manager.register(driver("/a")).unwrap();
        manager.register(driver("/a/b")).unwrap();

        let (s, actual) = manager.resolve("/a/b/c/f").unwrap();
        assert_eq!(s.mount_path(), "/a/b");
        assert_eq!(actual, "/c/f");

        let (s, actual) = manager.resolve("/a/bc").unwrap();
        assert_eq!(s.mount_path(), "/a");
        assert_eq!(actual, "/bc");

        let (s, actual) = manager.resolve("/x/y").unwrap();
        assert_eq!(s.mount_path(), "/");
        assert_eq!(actual, "/x/y");

        let (_, actual) = manager.resolve("/a").unwrap();
        assert_eq!(actual, "/");
    }

    #[test]
    fn test_duplicate_mount_rejected() {
        let manager = StorageManager::new(Arc::new(CacheManager::new()));
        manager.register(driver("/a")).unwrap();
        assert!(matches!(
            manager.register(driver("/a/")),
            Err(FsError::AlreadyExists(_))
        ));
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn test_unregister() {
        let manager = StorageManager::new(Arc::new(CacheManager::new()));
        manager.register(driver("/a")).unwrap();
        manager.unregister("/a").unwrap();
        assert!(manager.resolve("/a/f").is_err());
        assert!(manager.unregister("/a").is_err());
    }

    #[test]
    fn test_unregister_root_keeps_nested_mount_cache() {
        let cache = Arc::new(CacheManager::new());
        let manager = StorageManager::new(Arc::clone(&cache));
        let root = manager.register(driver("/")).unwrap();
        let nested = manager.register(driver("/a")).unwrap();
        let f = Obj::file("f", 1, std::time::SystemTime::UNIX_EPOCH);
        cache.set_dir(&root, "/docs", vec![f.clone()]);
        cache.set_dir(&nested, "/", vec![f.clone()]);
        cache.set_dir(&nested, "/sub", vec![f]);

        manager.unregister("/").unwrap();

        assert!(cache.dir(&root, "/docs").is_none());
        assert!(cache.dir(&nested, "/").is_some());
        assert!(cache.dir(&nested, "/sub").is_some());
    }

    #[test]
    fn test_health_gate() {
        let mut config = StorageConfig::new("/a");
        config.check_status = true;
        config.status = StorageStatus::Failed("token expired".to_string());
        let storage = Storage::new(Arc::new(NullDriver { config }));
        assert!(matches!(
            storage.check_health(),
            Err(FsError::StorageUnavailable(_, _))
        ));

        let mut config = StorageConfig::new("/a");
        config.status = StorageStatus::Disabled;
        let storage = Storage::new(Arc::new(NullDriver { config }));
        assert!(storage.check_health().is_ok());
    }
}
