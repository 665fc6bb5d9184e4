use std::sync::Arc;

use bytes::Bytes;
use vfs_gateway::cache::CacheManager;
use vfs_gateway::driver::local::LocalDriver;
use vfs_gateway::driver::StorageConfig;
use vfs_gateway::hook::HookRegistry;
use vfs_gateway::model::{FileStream, GetArgs, LinkArgs, ListArgs};
use vfs_gateway::op::{DispatchOptions, Dispatcher};
use vfs_gateway::storage::StorageManager;

fn setup(root: &std::path::Path) -> (StorageManager, Dispatcher) {
    let cache = Arc::new(CacheManager::new());
    let storages = StorageManager::new(cache.clone());
    storages
        .register(Arc::new(LocalDriver::new(root, StorageConfig::new("/local"))))
        .unwrap();
    let dispatcher = Dispatcher::new(cache, Arc::new(HookRegistry::new()), DispatchOptions::default());
    (storages, dispatcher)
}

#[tokio::test]
async fn test_local_storage_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("docs")).unwrap();
    std::fs::write(tmp.path().join("docs/readme.txt"), b"hello world").unwrap();
    let (storages, dispatcher) = setup(tmp.path());

    let (storage, path) = storages.resolve("/local/docs").unwrap();
    assert_eq!(path, "/docs");
    let objs = dispatcher
        .list(&storage, &path, ListArgs::default())
        .await
        .unwrap();
    assert_eq!(objs.len(), 1);
    assert_eq!(objs[0].name, "readme.txt");

    // Upload returns the stored object
    let uploaded = dispatcher
        .put(
            &storage,
            "/docs/new",
            FileStream::from_bytes("notes.md", Bytes::from_static(b"# notes")),
        )
        .await
        .unwrap();
    assert!(!uploaded.is_temp());
    assert_eq!(uploaded.size, 7);
    assert!(tmp.path().join("docs/new/notes.md").is_file());

    // Rename only signals success; the placeholder is replaced on demand
    dispatcher
        .rename(&storage, "/docs/readme.txt", "README")
        .await
        .unwrap();
    let renamed = dispatcher
        .get(&storage, "/docs/README", GetArgs::default())
        .await
        .unwrap();
    assert!(renamed.is_temp());
    let renamed = dispatcher
        .get(&storage, "/docs/README", GetArgs { no_temp: true })
        .await
        .unwrap();
    assert!(!renamed.is_temp());
    assert_eq!(renamed.size, 11);

    // Links hold the file open and read byte ranges
    let handle = dispatcher
        .link(&storage, "/docs/README", &LinkArgs::default())
        .await
        .unwrap();
    assert!(handle.link.url.starts_with("file://"));
    let reader = handle.reader().unwrap();
    assert_eq!(&reader.read_range(6, 5).await.unwrap()[..], b"world");

    dispatcher.remove(&storage, "/docs").await.unwrap();
    assert!(!tmp.path().join("docs").exists());
    assert!(dispatcher
        .get(&storage, "/docs/README", GetArgs::default())
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_missing_root_is_unavailable_when_checked() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = Arc::new(CacheManager::new());
    let storages = StorageManager::new(cache.clone());
    let mut config = StorageConfig::new("/gone");
    config.check_status = true;
    storages
        .register(Arc::new(LocalDriver::new(tmp.path().join("missing"), config)))
        .unwrap();
    let dispatcher = Dispatcher::new(cache, Arc::new(HookRegistry::new()), DispatchOptions::default());

    let (storage, path) = storages.resolve("/gone").unwrap();
    let err = dispatcher
        .list(&storage, &path, ListArgs::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        vfs_gateway::FsError::StorageUnavailable(_, _)
    ));
}
