pub mod local;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{FsError, Result};
use crate::model::{FileStream, Link, LinkArgs, ListArgs, Obj, StorageDetails};

/// Health of a storage as last observed by its driver
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageStatus {
    #[default]
    Working,
    Disabled,
    Failed(String),
}

impl StorageStatus {
    pub fn is_working(&self) -> bool {
        matches!(self, StorageStatus::Working)
    }
}

impl std::fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageStatus::Working => write!(f, "work"),
            StorageStatus::Disabled => write!(f, "disabled"),
            StorageStatus::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// Field used to order a directory listing locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    Name,
    Size,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// Where folders are placed in a sorted listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractFolder {
    #[default]
    None,
    Front,
    Back,
}

/// Storage configuration as exposed by a driver (read-only to this layer)
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Where the storage appears in the unified namespace
    pub mount_path: String,
    /// Directory cache lifetime in minutes; 0 disables directory caching
    pub cache_expiration: u64,
    pub no_cache: bool,
    /// Sort listings here instead of trusting the backend's order
    pub local_sort: bool,
    /// Refuse calls while `status` is not working
    pub check_status: bool,
    pub status: StorageStatus,
    pub order_by: Option<OrderBy>,
    pub order_direction: OrderDirection,
    pub extract_folder: ExtractFolder,
}

impl StorageConfig {
    pub fn new(mount_path: impl Into<String>) -> Self {
        Self {
            mount_path: mount_path.into(),
            cache_expiration: 30,
            no_cache: false,
            local_sort: false,
            check_status: false,
            status: StorageStatus::Working,
            order_by: None,
            order_direction: OrderDirection::Asc,
            extract_folder: ExtractFolder::None,
        }
    }

    /// Whether directory listings of this storage may be cached
    pub fn caches_listings(&self) -> bool {
        !self.no_cache && self.cache_expiration > 0
    }
}

/// Which form of a verb a driver implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Verb not available
    #[default]
    Absent,
    /// Signals success only
    Plain,
    /// Returns the authoritative new or updated object
    ReturnsObject,
}

impl Variant {
    pub fn is_present(self) -> bool {
        !matches!(self, Variant::Absent)
    }
}

/// Driver capabilities declaration
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Native single-object lookup
    pub get: bool,
    pub make_dir: Variant,
    pub move_to: Variant,
    pub rename: Variant,
    pub copy_to: Variant,
    pub remove: bool,
    pub put: Variant,
    pub put_url: Variant,
    /// Can report space usage
    pub details: bool,
}

impl Capabilities {
    /// Listing and links only
    pub fn read_only() -> Self {
        Self::default()
    }
}

/// Request attributes that make a cached link specific to its requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkCacheMode {
    pub ip: bool,
    pub user_agent: bool,
}

impl LinkCacheMode {
    /// Subtype key under which a link for these arguments is cached
    pub fn type_key(&self, args: &LinkArgs) -> String {
        let mut key = String::new();
        if self.ip {
            key.push_str(args.ip.as_deref().unwrap_or_default());
        }
        if self.user_agent {
            key.push(':');
            key.push_str(args.user_agent().unwrap_or_default());
        }
        key
    }
}

/// Core driver trait for storage backends
///
/// Drivers are path-based: objects carry their path relative to the storage
/// root and may additionally carry a backend id. Every optional verb defaults
/// to `NotImplemented`; `capabilities()` declares which ones actually exist
/// and, for mutations, whether the driver returns the resulting object.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Current storage configuration and status
    fn config(&self) -> StorageConfig;

    /// Get driver capabilities
    fn capabilities(&self) -> Capabilities;

    /// Which request attributes distinguish cached links
    fn link_cache_mode(&self) -> LinkCacheMode {
        LinkCacheMode::default()
    }

    /// List the children of a directory
    async fn list(&self, dir: &Obj, args: &ListArgs) -> Result<Vec<Obj>>;

    /// Look up a single object without listing its parent
    async fn get(&self, _path: &str) -> Result<Obj> {
        Err(FsError::NotImplemented)
    }

    /// Resolve a download link for a file
    async fn link(&self, file: &Obj, args: &LinkArgs) -> Result<Link>;

    async fn make_dir(&self, _parent: &Obj, _name: &str) -> Result<()> {
        Err(FsError::NotImplemented)
    }

    async fn make_dir_obj(&self, _parent: &Obj, _name: &str) -> Result<Obj> {
        Err(FsError::NotImplemented)
    }

    async fn move_to(&self, _src: &Obj, _dst_dir: &Obj) -> Result<()> {
        Err(FsError::NotImplemented)
    }

    async fn move_to_obj(&self, _src: &Obj, _dst_dir: &Obj) -> Result<Obj> {
        Err(FsError::NotImplemented)
    }

    async fn rename(&self, _src: &Obj, _new_name: &str) -> Result<()> {
        Err(FsError::NotImplemented)
    }

    async fn rename_obj(&self, _src: &Obj, _new_name: &str) -> Result<Obj> {
        Err(FsError::NotImplemented)
    }

    async fn copy_to(&self, _src: &Obj, _dst_dir: &Obj) -> Result<()> {
        Err(FsError::NotImplemented)
    }

    async fn copy_to_obj(&self, _src: &Obj, _dst_dir: &Obj) -> Result<Obj> {
        Err(FsError::NotImplemented)
    }

    async fn remove(&self, _obj: &Obj) -> Result<()> {
        Err(FsError::NotImplemented)
    }

    async fn put(&self, _dst_dir: &Obj, _file: FileStream) -> Result<()> {
        Err(FsError::NotImplemented)
    }

    async fn put_obj(&self, _dst_dir: &Obj, _file: FileStream) -> Result<Obj> {
        Err(FsError::NotImplemented)
    }

    /// Have the backend fetch a remote URL into a new file
    async fn put_url(&self, _dst_dir: &Obj, _name: &str, _url: &str) -> Result<()> {
        Err(FsError::NotImplemented)
    }

    async fn put_url_obj(&self, _dst_dir: &Obj, _name: &str, _url: &str) -> Result<Obj> {
        Err(FsError::NotImplemented)
    }

    /// Report space usage
    async fn details(&self) -> Result<StorageDetails> {
        Err(FsError::NotImplemented)
    }
}
