//! Driver over a directory of the host filesystem
//!
//! Links point at the file itself and come with a reference-counted range
//! reader; the file handle stays open until the link is retired and the last
//! reader is released.

use std::fs::Metadata;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use super::{Capabilities, Driver, StorageConfig, StorageStatus, Variant};
use crate::error::{FsError, Result};
use crate::model::{
    FileStream, Link, LinkArgs, LinkResource, ListArgs, Obj, RangeReader,
};
use crate::path;

/// Serves a host directory as a storage
pub struct LocalDriver {
    root: PathBuf,
    config: StorageConfig,
    /// Why the root is unusable, as of the last check
    root_failure: RwLock<Option<String>>,
}

impl LocalDriver {
    pub fn new(root: impl Into<PathBuf>, config: StorageConfig) -> Self {
        let root = root.into();
        let root_failure = RwLock::new(root_failure(&root, root.is_dir()));
        Self {
            root,
            config,
            root_failure,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-check the root directory and return the resulting status
    ///
    /// `config()` only reports the outcome of the latest check.
    pub async fn check_root(&self) -> StorageStatus {
        let is_dir = tokio::fs::metadata(&self.root)
            .await
            .is_ok_and(|meta| meta.is_dir());
        *self.root_failure.write() = root_failure(&self.root, is_dir);
        self.config().status
    }

    /// Host path for a storage-relative path
    fn host_path(&self, obj_path: &str) -> PathBuf {
        let obj_path = path::normalize(obj_path);
        self.root.join(obj_path.trim_start_matches('/'))
    }

    async fn stat(&self, obj_path: &str) -> Result<Obj> {
        let host = self.host_path(obj_path);
        let meta = tokio::fs::metadata(&host)
            .await
            .map_err(|e| map_io(e, obj_path))?;
        let (_, name) = path::split(obj_path);
        Ok(to_obj(name, obj_path, &meta))
    }
}

fn root_failure(root: &Path, is_dir: bool) -> Option<String> {
    (!is_dir).then(|| format!("root {} is not a directory", root.display()))
}

fn to_obj(name: String, obj_path: &str, meta: &Metadata) -> Obj {
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let mut obj = if meta.is_dir() {
        Obj::directory(name, modified)
    } else {
        Obj::file(name, meta.len(), modified)
    };
    obj.created = meta.created().unwrap_or(modified);
    obj.with_path(obj_path)
}

fn map_io(e: io::Error, obj_path: &str) -> FsError {
    match e.kind() {
        io::ErrorKind::NotFound => FsError::NotFound(obj_path.to_string()),
        io::ErrorKind::PermissionDenied => FsError::PermissionDenied(obj_path.to_string()),
        io::ErrorKind::AlreadyExists => FsError::AlreadyExists(obj_path.to_string()),
        _ => e.into(),
    }
}

#[async_trait]
impl Driver for LocalDriver {
    fn config(&self) -> StorageConfig {
        let mut config = self.config.clone();
        if let Some(reason) = self.root_failure.read().clone() {
            config.status = StorageStatus::Failed(reason);
        }
        config
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            get: true,
            make_dir: Variant::ReturnsObject,
            move_to: Variant::Plain,
            rename: Variant::Plain,
            copy_to: Variant::Plain,
            remove: true,
            put: Variant::ReturnsObject,
            put_url: Variant::Absent,
            details: false,
        }
    }

    async fn list(&self, dir: &Obj, _args: &ListArgs) -> Result<Vec<Obj>> {
        let host = self.host_path(&dir.path);
        trace!("read_dir {:?}", host);
        let mut entries = tokio::fs::read_dir(&host)
            .await
            .map_err(|e| map_io(e, &dir.path))?;

        let mut objs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let obj_path = path::join(&dir.path, &name);
            match entry.metadata().await {
                Ok(meta) => objs.push(to_obj(name, &obj_path, &meta)),
                // Entry vanished between read_dir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(objs)
    }

    async fn get(&self, obj_path: &str) -> Result<Obj> {
        self.stat(obj_path).await
    }

    async fn link(&self, file: &Obj, _args: &LinkArgs) -> Result<Link> {
        let host = self.host_path(&file.path);
        let handle = tokio::fs::File::open(&host)
            .await
            .map_err(|e| map_io(e, &file.path))?
            .into_std()
            .await;

        let shared = Arc::new(RwLock::new(Some(Arc::new(handle))));
        let reader = Arc::new(FileRangeReader {
            file: Arc::clone(&shared),
        });
        let shown = host.display().to_string();
        let resource = LinkResource::new(move || {
            debug!("closing {}", shown);
            shared.write().take();
            Ok(())
        })
        .with_reader(reader);

        Ok(Link::new(format!("file://{}", host.display())).with_resource(resource))
    }

    async fn make_dir_obj(&self, parent: &Obj, name: &str) -> Result<Obj> {
        let obj_path = path::join(&parent.path, name);
        tokio::fs::create_dir(self.host_path(&obj_path))
            .await
            .map_err(|e| map_io(e, &obj_path))?;
        self.stat(&obj_path).await
    }

    async fn move_to(&self, src: &Obj, dst_dir: &Obj) -> Result<()> {
        let dst = path::join(&dst_dir.path, &src.name);
        tokio::fs::rename(self.host_path(&src.path), self.host_path(&dst))
            .await
            .map_err(|e| map_io(e, &src.path))
    }

    async fn rename(&self, src: &Obj, new_name: &str) -> Result<()> {
        let (parent, _) = path::split(&src.path);
        let dst = path::join(&parent, new_name);
        tokio::fs::rename(self.host_path(&src.path), self.host_path(&dst))
            .await
            .map_err(|e| map_io(e, &src.path))
    }

    async fn copy_to(&self, src: &Obj, dst_dir: &Obj) -> Result<()> {
        if src.is_dir {
            return Err(FsError::NotSupported("copying folders".to_string()));
        }
        let dst = path::join(&dst_dir.path, &src.name);
        tokio::fs::copy(self.host_path(&src.path), self.host_path(&dst))
            .await
            .map_err(|e| map_io(e, &src.path))?;
        Ok(())
    }

    async fn remove(&self, obj: &Obj) -> Result<()> {
        let host = self.host_path(&obj.path);
        let result = if obj.is_dir {
            tokio::fs::remove_dir_all(&host).await
        } else {
            tokio::fs::remove_file(&host).await
        };
        result.map_err(|e| map_io(e, &obj.path))
    }

    async fn put_obj(&self, dst_dir: &Obj, mut file: FileStream) -> Result<Obj> {
        let obj_path = path::join(&dst_dir.path, &file.name);
        let mut out = tokio::fs::File::create(self.host_path(&obj_path))
            .await
            .map_err(|e| map_io(e, &obj_path))?;
        let mut written = 0u64;
        while let Some(chunk) = file.content.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        debug!("wrote {} bytes to {}", written, obj_path);
        self.stat(&obj_path).await
    }
}

/// Positional reads from a file held open by a link
struct FileRangeReader {
    file: Arc<RwLock<Option<Arc<std::fs::File>>>>,
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        let file = self
            .file
            .read()
            .clone()
            .ok_or_else(|| FsError::Backend("link resource is closed".to_string()))?;

        let data = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            // Callers may ask for more than is left, e.g. u64::MAX for "to the end"
            let size = file.metadata()?.len();
            if offset >= size {
                return Ok(Vec::new());
            }
            let mut buf = vec![0u8; length.min(size - offset) as usize];
            let mut filled = 0;
            while filled < buf.len() {
                match file.read_at(&mut buf[filled..], offset + filled as u64)? {
                    0 => break,
                    n => filled += n,
                }
            }
            buf.truncate(filled);
            Ok(buf)
        })
        .await
        .map_err(|e| FsError::Backend(format!("read task failed: {}", e)))??;
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(root: &Path) -> LocalDriver {
        LocalDriver::new(root, StorageConfig::new("/local"))
    }

    fn root_dir() -> Obj {
        Obj::directory("", SystemTime::UNIX_EPOCH).with_path("/")
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let driver = driver(tmp.path());

        let mut objs = driver.list(&root_dir(), &ListArgs::default()).await.unwrap();
        objs.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0].name, "a.txt");
        assert_eq!(objs[0].size, 5);
        assert_eq!(objs[0].path, "/a.txt");
        assert!(objs[1].is_dir);

        let obj = driver.get("/sub").await.unwrap();
        assert!(obj.is_dir);
        assert!(driver.get("/missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mutations() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("f"), b"data").unwrap();
        let driver = driver(tmp.path());

        let dir = driver.make_dir_obj(&root_dir(), "d").await.unwrap();
        assert_eq!(dir.path, "/d");
        assert!(matches!(
            driver.make_dir_obj(&root_dir(), "d").await,
            Err(FsError::AlreadyExists(_))
        ));

        let f = driver.get("/f").await.unwrap();
        driver.copy_to(&f, &dir).await.unwrap();
        assert!(tmp.path().join("d/f").is_file());

        driver.rename(&f, "g").await.unwrap();
        let g = driver.get("/g").await.unwrap();
        driver.move_to(&g, &dir).await.unwrap();
        assert!(tmp.path().join("d/g").is_file());

        driver.remove(&dir).await.unwrap();
        assert!(!tmp.path().join("d").exists());
    }

    #[tokio::test]
    async fn test_put_obj_streams_content() {
        let tmp = tempfile::tempdir().unwrap();
        let driver = driver(tmp.path());
        let obj = driver
            .put_obj(&root_dir(), FileStream::from_bytes("up.bin", Bytes::from_static(b"12345")))
            .await
            .unwrap();
        assert_eq!(obj.size, 5);
        assert_eq!(std::fs::read(tmp.path().join("up.bin")).unwrap(), b"12345");
    }

    #[tokio::test]
    async fn test_link_reader_and_close() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("f"), b"0123456789").unwrap();
        let driver = driver(tmp.path());
        let f = driver.get("/f").await.unwrap();

        let link = driver.link(&f, &LinkArgs::default()).await.unwrap();
        assert!(link.url.starts_with("file://"));
        let resource = link.resource.clone().unwrap();

        let held = resource.acquire().unwrap();
        let reader = held.resource().reader().unwrap().clone();
        assert_eq!(&reader.read_range(2, 3).await.unwrap()[..], b"234");
        assert_eq!(&reader.read_range(8, 10).await.unwrap()[..], b"89");

        resource.retire();
        assert!(!resource.is_closed());
        drop(held);
        assert!(resource.is_closed());
        assert!(reader.read_range(0, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_read_range_clamps_to_file_size() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("f"), b"0123456789").unwrap();
        let driver = driver(tmp.path());
        let f = driver.get("/f").await.unwrap();

        let link = driver.link(&f, &LinkArgs::default()).await.unwrap();
        let resource = link.resource.clone().unwrap();
        let held = resource.acquire().unwrap();
        let reader = held.resource().reader().unwrap().clone();

        assert_eq!(&reader.read_range(0, u64::MAX).await.unwrap()[..], b"0123456789");
        assert_eq!(&reader.read_range(4, u64::MAX).await.unwrap()[..], b"456789");
        assert!(reader.read_range(100, 5).await.unwrap().is_empty());
        assert!(reader.read_range(10, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_reports_failed_status() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("gone");
        let driver = driver(&root);
        assert!(!driver.config().status.is_working());

        std::fs::create_dir(&root).unwrap();
        assert!(!driver.config().status.is_working());
        assert!(driver.check_root().await.is_working());
        assert!(driver.config().status.is_working());

        std::fs::remove_dir(&root).unwrap();
        assert!(matches!(driver.check_root().await, StorageStatus::Failed(_)));
    }
}
