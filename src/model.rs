//! Objects, links and the argument types passed through the dispatcher

use std::collections::HashMap;
use std::ops::BitOr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{FsError, Result};

/// Bit set of object flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ObjMask(u8);

impl ObjMask {
    pub const NONE: ObjMask = ObjMask(0);
    /// Synthesized locally after a mutation, not yet confirmed by the backend
    pub const TEMP: ObjMask = ObjMask(1);

    pub fn contains(self, other: ObjMask) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn insert(&mut self, other: ObjMask) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ObjMask) {
        self.0 &= !other.0;
    }
}

impl BitOr for ObjMask {
    type Output = ObjMask;

    fn bitor(self, rhs: ObjMask) -> ObjMask {
        ObjMask(self.0 | rhs.0)
    }
}

/// A file or folder as reported by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Obj {
    /// Backend-specific identifier, if the backend addresses objects by id
    pub id: Option<String>,
    pub name: String,
    /// Path relative to the storage root
    pub path: String,
    pub size: u64,
    pub modified: SystemTime,
    pub created: SystemTime,
    pub is_dir: bool,
    /// Content hash in `algo:hex` form
    pub hash: Option<String>,
    pub mask: ObjMask,
}

impl Obj {
    pub fn file(name: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            id: None,
            name: name.into(),
            path: String::new(),
            size,
            modified,
            created: modified,
            is_dir: false,
            hash: None,
            mask: ObjMask::NONE,
        }
    }

    pub fn directory(name: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            id: None,
            name: name.into(),
            path: String::new(),
            size: 0,
            modified,
            created: modified,
            is_dir: true,
            hash: None,
            mask: ObjMask::NONE,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Mark as a local placeholder awaiting backend confirmation
    pub fn into_temp(mut self) -> Self {
        self.mask.insert(ObjMask::TEMP);
        self
    }

    pub fn is_temp(&self) -> bool {
        self.mask.contains(ObjMask::TEMP)
    }
}

/// Arguments for listing a directory
#[derive(Debug, Clone, Copy, Default)]
pub struct ListArgs {
    /// Bypass the directory cache
    pub refresh: bool,
    /// Ask the backend for extended attributes where it supports them
    pub with_details: bool,
}

/// Arguments for resolving a single object
#[derive(Debug, Clone, Copy, Default)]
pub struct GetArgs {
    /// Reject placeholder objects and re-list instead
    pub no_temp: bool,
}

/// Request attributes forwarded to a backend when resolving a link
#[derive(Debug, Clone, Default)]
pub struct LinkArgs {
    pub ip: Option<String>,
    pub header: HashMap<String, String>,
    pub redirect: bool,
}

impl LinkArgs {
    pub fn user_agent(&self) -> Option<&str> {
        self.header
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .map(|(_, v)| v.as_str())
    }
}

/// Byte-range access to a resource held open by a link
#[async_trait]
pub trait RangeReader: Send + Sync {
    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes>;
}

type Closer = Box<dyn FnOnce() -> Result<()> + Send>;

/// A live, reference-counted resource backing a link
///
/// Consumers must `acquire` before use. Once `retire` has been called no new
/// reference can be taken, and the closer runs exactly once, when the last
/// outstanding reference is released.
pub struct LinkResource {
    /// Outstanding references; -1 once closed
    refs: AtomicI64,
    retiring: AtomicBool,
    closer: Mutex<Option<Closer>>,
    reader: Option<Arc<dyn RangeReader>>,
}

impl LinkResource {
    pub fn new(closer: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            refs: AtomicI64::new(0),
            retiring: AtomicBool::new(false),
            closer: Mutex::new(Some(Box::new(closer))),
            reader: None,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn RangeReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn reader(&self) -> Option<&Arc<dyn RangeReader>> {
        self.reader.as_ref()
    }

    /// Take a reference, failing if the resource is being torn down
    pub fn acquire(self: &Arc<Self>) -> Option<ResourceRef> {
        let mut current = self.refs.load(Ordering::Acquire);
        loop {
            if current < 0 || self.retiring.load(Ordering::Acquire) {
                return None;
            }
            match self.refs.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(ResourceRef {
                        resource: Arc::clone(self),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Refuse new references and close once the outstanding ones are released
    pub fn retire(&self) {
        self.retiring.store(true, Ordering::Release);
        self.try_close();
    }

    pub fn ref_count(&self) -> i64 {
        self.refs.load(Ordering::Acquire).max(0)
    }

    pub fn is_closed(&self) -> bool {
        self.refs.load(Ordering::Acquire) < 0
    }

    fn release(&self) {
        let previous = self.refs.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 && self.retiring.load(Ordering::Acquire) {
            self.try_close();
        }
    }

    fn try_close(&self) {
        if self
            .refs
            .compare_exchange(0, -1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Some(closer) = self.closer.lock().take() {
            debug!("closing link resource");
            if let Err(e) = closer() {
                warn!("Failed to close link resource: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for LinkResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkResource")
            .field("refs", &self.refs.load(Ordering::Relaxed))
            .field("retiring", &self.retiring.load(Ordering::Relaxed))
            .finish()
    }
}

/// A held reference to a `LinkResource`, released on drop
#[derive(Debug)]
pub struct ResourceRef {
    resource: Arc<LinkResource>,
}

impl ResourceRef {
    pub fn resource(&self) -> &Arc<LinkResource> {
        &self.resource
    }
}

impl Drop for ResourceRef {
    fn drop(&mut self) {
        self.resource.release();
    }
}

/// A backend-issued way to fetch an object's content
#[derive(Debug, Clone, Default)]
pub struct Link {
    pub url: String,
    pub header: HashMap<String, String>,
    /// How long the link stays valid after it was issued
    pub expiration: Option<Duration>,
    /// Live resource that must be acquired before use
    pub resource: Option<Arc<LinkResource>>,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_resource(mut self, resource: LinkResource) -> Self {
        self.resource = Some(Arc::new(resource));
        self
    }

    pub fn requires_reference(&self) -> bool {
        self.resource.is_some()
    }
}

/// Stream of content chunks for uploads
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Content handed to a backend's put
pub struct FileStream {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
    pub mimetype: Option<String>,
    pub content: ByteStream,
}

impl FileStream {
    pub fn from_bytes(name: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            size: data.len() as u64,
            modified: SystemTime::now(),
            mimetype: None,
            content: Box::pin(futures::stream::once(async move {
                Ok::<_, FsError>(data)
            })),
        }
    }
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mimetype", &self.mimetype)
            .finish()
    }
}

/// Space usage reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageDetails {
    pub total_space: u64,
    pub used_space: u64,
}

impl StorageDetails {
    pub fn free_space(&self) -> u64 {
        self.total_space.saturating_sub(self.used_space)
    }
}
