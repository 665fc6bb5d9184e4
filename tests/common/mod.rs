//! Shared fixtures for dispatcher integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use vfs_gateway::cache::CacheManager;
use vfs_gateway::driver::{Capabilities, Driver, LinkCacheMode, StorageConfig, Variant};
use vfs_gateway::error::{FsError, Result};
use vfs_gateway::hook::{HookRegistry, UpdateSubscriber};
use vfs_gateway::model::{
    FileStream, Link, LinkArgs, LinkResource, ListArgs, Obj, StorageDetails,
};
use vfs_gateway::op::{DispatchOptions, Dispatcher};
use vfs_gateway::path;
use vfs_gateway::storage::Storage;

/// Backend calls observed by the mock, per verb
#[derive(Default)]
pub struct Calls {
    pub list: AtomicUsize,
    pub get: AtomicUsize,
    pub link: AtomicUsize,
    pub make_dir: AtomicUsize,
    pub move_to: AtomicUsize,
    pub rename: AtomicUsize,
    pub copy: AtomicUsize,
    pub remove: AtomicUsize,
    pub put: AtomicUsize,
    pub put_url: AtomicUsize,
    pub details: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// What the mock's `link` hands out
#[derive(Debug, Clone, Copy)]
pub enum LinkMode {
    /// No expiration, no resource
    Plain,
    /// Valid for the given duration
    Expiring(Duration),
    /// Backed by a reference-counted resource
    Referenced,
}

/// In-memory backend with a path-keyed tree
pub struct MockDriver {
    config: Mutex<StorageConfig>,
    capabilities: Capabilities,
    link_cache_mode: LinkCacheMode,
    link_mode: LinkMode,
    tree: Mutex<BTreeMap<String, Obj>>,
    delay: Mutex<Option<Duration>>,
    list_error: Mutex<Option<FsError>>,
    /// Every directory listed, with the (tokio) time it was listed
    list_log: Mutex<Vec<(String, Instant)>>,
    pub calls: Calls,
    /// Number of link resources whose closer has run
    pub closed: Arc<AtomicUsize>,
}

pub fn time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

impl MockDriver {
    pub fn new(mount_path: &str) -> Self {
        Self {
            config: Mutex::new(StorageConfig::new(mount_path)),
            capabilities: Capabilities::read_only(),
            link_cache_mode: LinkCacheMode::default(),
            link_mode: LinkMode::Plain,
            tree: Mutex::new(BTreeMap::new()),
            delay: Mutex::new(None),
            list_error: Mutex::new(None),
            list_log: Mutex::new(Vec::new()),
            calls: Calls::default(),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every mutation available, signalling success only
    pub fn writable(mount_path: &str) -> Self {
        Self::new(mount_path).with_capabilities(Capabilities {
            get: false,
            make_dir: Variant::Plain,
            move_to: Variant::Plain,
            rename: Variant::Plain,
            copy_to: Variant::Plain,
            remove: true,
            put: Variant::Plain,
            put_url: Variant::Plain,
            details: true,
        })
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_link_mode(mut self, mode: LinkMode) -> Self {
        self.link_mode = mode;
        self
    }

    pub fn with_link_cache_mode(mut self, mode: LinkCacheMode) -> Self {
        self.link_cache_mode = mode;
        self
    }

    pub fn with_config(self, f: impl FnOnce(&mut StorageConfig)) -> Self {
        f(&mut self.config.lock());
        self
    }

    pub fn update_config(&self, f: impl FnOnce(&mut StorageConfig)) {
        f(&mut self.config.lock());
    }

    pub fn with_dir(self, dir_path: &str) -> Self {
        let (_, name) = path::split(dir_path);
        self.insert(Obj::directory(name, time(1)).with_path(dir_path));
        self
    }

    pub fn with_file(self, file_path: &str, size: u64) -> Self {
        let (_, name) = path::split(file_path);
        self.insert(Obj::file(name, size, time(2)).with_path(file_path));
        self
    }

    /// Slow down every list and link call
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn fail_lists_with(&self, error: Option<FsError>) {
        *self.list_error.lock() = error;
    }

    /// Listings of `root` and everything beneath it, oldest first
    pub fn listed_under(&self, root: &str) -> Vec<(String, Instant)> {
        self.list_log
            .lock()
            .iter()
            .filter(|(p, _)| path::is_ancestor(root, p))
            .cloned()
            .collect()
    }

    pub fn exists(&self, obj_path: &str) -> bool {
        self.tree.lock().contains_key(obj_path)
    }

    fn insert(&self, obj: Obj) {
        self.tree.lock().insert(obj.path.clone(), obj);
    }

    fn lookup(&self, obj_path: &str) -> Result<Obj> {
        if obj_path == "/" {
            return Ok(Obj::directory("", time(0)).with_path("/"));
        }
        self.tree
            .lock()
            .get(obj_path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(obj_path.to_string()))
    }

    fn require_dir(&self, dir: &Obj) -> Result<()> {
        if self.lookup(&dir.path)?.is_dir {
            Ok(())
        } else {
            Err(FsError::NotAFolder(dir.path.clone()))
        }
    }

    /// Re-root `src` and everything beneath it at `dst`
    fn relocate(&self, src: &str, dst: &str, keep_source: bool) {
        let mut tree = self.tree.lock();
        let moved: Vec<(String, Obj)> = tree
            .iter()
            .filter(|(p, _)| path::is_ancestor(src, p))
            .map(|(p, o)| (p.clone(), o.clone()))
            .collect();
        for (old_path, mut obj) in moved {
            if !keep_source {
                tree.remove(&old_path);
            }
            let new_path = path::normalize(&format!("{}{}", dst, &old_path[src.len()..]));
            if old_path == src {
                let (_, name) = path::split(&new_path);
                obj.name = name;
            }
            obj.path = new_path.clone();
            tree.insert(new_path, obj);
        }
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn config(&self) -> StorageConfig {
        self.config.lock().clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn link_cache_mode(&self) -> LinkCacheMode {
        self.link_cache_mode
    }

    async fn list(&self, dir: &Obj, _args: &ListArgs) -> Result<Vec<Obj>> {
        bump(&self.calls.list);
        self.list_log.lock().push((dir.path.clone(), Instant::now()));
        self.pause().await;
        let error = self.list_error.lock().clone();
        if let Some(error) = error {
            return Err(error);
        }
        self.require_dir(dir)?;
        let children = self
            .tree
            .lock()
            .values()
            .filter(|o| path::split(&o.path).0 == dir.path)
            .cloned()
            .collect();
        Ok(children)
    }

    async fn get(&self, obj_path: &str) -> Result<Obj> {
        bump(&self.calls.get);
        if !self.capabilities.get {
            return Err(FsError::NotImplemented);
        }
        self.lookup(obj_path)
    }

    async fn link(&self, file: &Obj, _args: &LinkArgs) -> Result<Link> {
        bump(&self.calls.link);
        self.pause().await;
        self.lookup(&file.path)?;
        let link = Link::new(format!("mock://{}", file.path));
        Ok(match self.link_mode {
            LinkMode::Plain => link,
            LinkMode::Expiring(ttl) => link.with_expiration(ttl),
            LinkMode::Referenced => {
                let closed = Arc::clone(&self.closed);
                link.with_resource(LinkResource::new(move || {
                    closed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            }
        })
    }

    async fn make_dir(&self, parent: &Obj, name: &str) -> Result<()> {
        self.make_dir_obj(parent, name).await.map(|_| ())
    }

    async fn make_dir_obj(&self, parent: &Obj, name: &str) -> Result<Obj> {
        bump(&self.calls.make_dir);
        self.require_dir(parent)?;
        let dir_path = path::join(&parent.path, name);
        if self.exists(&dir_path) {
            return Err(FsError::AlreadyExists(dir_path));
        }
        let obj = Obj::directory(name, time(3)).with_path(dir_path);
        self.insert(obj.clone());
        Ok(obj)
    }

    async fn move_to(&self, src: &Obj, dst_dir: &Obj) -> Result<()> {
        self.move_to_obj(src, dst_dir).await.map(|_| ())
    }

    async fn move_to_obj(&self, src: &Obj, dst_dir: &Obj) -> Result<Obj> {
        bump(&self.calls.move_to);
        self.require_dir(dst_dir)?;
        let dst = path::join(&dst_dir.path, &src.name);
        self.relocate(&src.path, &dst, false);
        self.lookup(&dst)
    }

    async fn rename(&self, src: &Obj, new_name: &str) -> Result<()> {
        self.rename_obj(src, new_name).await.map(|_| ())
    }

    async fn rename_obj(&self, src: &Obj, new_name: &str) -> Result<Obj> {
        bump(&self.calls.rename);
        self.lookup(&src.path)?;
        let (parent, _) = path::split(&src.path);
        let dst = path::join(&parent, new_name);
        self.relocate(&src.path, &dst, false);
        self.lookup(&dst)
    }

    async fn copy_to(&self, src: &Obj, dst_dir: &Obj) -> Result<()> {
        self.copy_to_obj(src, dst_dir).await.map(|_| ())
    }

    async fn copy_to_obj(&self, src: &Obj, dst_dir: &Obj) -> Result<Obj> {
        bump(&self.calls.copy);
        self.require_dir(dst_dir)?;
        let dst = path::join(&dst_dir.path, &src.name);
        self.relocate(&src.path, &dst, true);
        self.lookup(&dst)
    }

    async fn remove(&self, obj: &Obj) -> Result<()> {
        bump(&self.calls.remove);
        let mut tree = self.tree.lock();
        let before = tree.len();
        tree.retain(|p, _| !path::is_ancestor(&obj.path, p));
        if tree.len() == before {
            return Err(FsError::NotFound(obj.path.clone()));
        }
        Ok(())
    }

    async fn put(&self, dst_dir: &Obj, file: FileStream) -> Result<()> {
        self.put_obj(dst_dir, file).await.map(|_| ())
    }

    async fn put_obj(&self, dst_dir: &Obj, file: FileStream) -> Result<Obj> {
        bump(&self.calls.put);
        self.require_dir(dst_dir)?;
        let obj = Obj::file(file.name.as_str(), file.size, time(4))
            .with_path(path::join(&dst_dir.path, &file.name));
        self.insert(obj.clone());
        Ok(obj)
    }

    async fn put_url(&self, dst_dir: &Obj, name: &str, url: &str) -> Result<()> {
        self.put_url_obj(dst_dir, name, url).await.map(|_| ())
    }

    async fn put_url_obj(&self, dst_dir: &Obj, name: &str, _url: &str) -> Result<Obj> {
        bump(&self.calls.put_url);
        self.require_dir(dst_dir)?;
        let obj = Obj::file(name, 1024, time(5)).with_path(path::join(&dst_dir.path, name));
        self.insert(obj.clone());
        Ok(obj)
    }

    async fn details(&self) -> Result<StorageDetails> {
        bump(&self.calls.details);
        Ok(StorageDetails {
            total_space: 1000,
            used_space: 250,
        })
    }
}

/// A mounted mock with its dispatcher
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub storage: Arc<Storage>,
    pub driver: Arc<MockDriver>,
    pub cache: Arc<CacheManager>,
    pub hooks: Arc<HookRegistry>,
}

pub fn mount(driver: MockDriver) -> Harness {
    mount_with(driver, DispatchOptions::default())
}

pub fn mount_with(driver: MockDriver, options: DispatchOptions) -> Harness {
    let driver = Arc::new(driver);
    let storage = Arc::new(Storage::new(driver.clone()));
    let cache = Arc::new(CacheManager::new());
    let hooks = Arc::new(HookRegistry::new());
    let dispatcher = Dispatcher::new(cache.clone(), hooks.clone(), options);
    Harness {
        dispatcher,
        storage,
        driver,
        cache,
        hooks,
    }
}

/// Subscriber forwarding every update to a channel
pub struct Recorder {
    tx: mpsc::UnboundedSender<(String, Vec<Obj>)>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Vec<Obj>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl UpdateSubscriber for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn on_update(&self, path: &str, objs: &[Obj]) -> Result<()> {
        let _ = self.tx.send((path.to_string(), objs.to_vec()));
        Ok(())
    }
}
