//! vfs-gateway: a caching, request-coalescing layer over pluggable storage backends
//!
//! Many heterogeneous storage backends are exposed through one path-addressed
//! API. This crate is the layer between those backends and their callers: it
//! avoids redundant backend calls, keeps cached listings and links coherent
//! under concurrent mutation, and manages the lifetime of backend-issued
//! resources.
//!
//! # Architecture
//!
//! - **Drivers**: storage backends implementing the `Driver` trait and
//!   declaring which verbs they support through `Capabilities`.
//! - **Storages**: mounted drivers with their capabilities queried once, kept
//!   in a mount table that resolves full paths.
//! - **Caches**: directory listings, link variants, storage details, users
//!   and settings, all owned by an injected `CacheManager`.
//! - **Coalescing**: concurrent identical listings and link resolutions share
//!   one in-flight backend call.
//! - **Dispatcher**: one method per filesystem verb, tying the above together
//!   and notifying update hooks.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vfs_gateway::cache::CacheManager;
//! use vfs_gateway::driver::local::LocalDriver;
//! use vfs_gateway::driver::StorageConfig;
//! use vfs_gateway::hook::HookRegistry;
//! use vfs_gateway::model::ListArgs;
//! use vfs_gateway::op::{DispatchOptions, Dispatcher};
//! use vfs_gateway::storage::StorageManager;
//!
//! # async fn example() -> vfs_gateway::Result<()> {
//! let cache = Arc::new(CacheManager::new());
//! let storages = StorageManager::new(cache.clone());
//! storages.register(Arc::new(LocalDriver::new(
//!     "/srv/files",
//!     StorageConfig::new("/local"),
//! )))?;
//!
//! let dispatcher = Dispatcher::new(cache, Arc::new(HookRegistry::new()), DispatchOptions::default());
//! let (storage, path) = storages.resolve("/local/docs")?;
//! for obj in dispatcher.list(&storage, &path, ListArgs::default()).await? {
//!     println!("{}", obj.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod driver;
pub mod env;
pub mod error;
pub mod hook;
pub mod model;
pub mod op;
pub mod path;
pub mod storage;

pub use error::{FsError, Result};
