//! Process-lifetime caches over backend results
//!
//! - [`KeyedCache`]: key → value with lazy, double-checked expiry
//! - [`TypedCache`]: (key, subtype) → value, used for link variants
//! - [`DirectoryEntry`]: one directory's listing with a lazily sorted view
//! - [`CacheManager`]: owns every cache and the mutation primitives the
//!   dispatcher applies after each operation
//!
//! Nothing here is persisted.

pub mod directory;
pub mod keyed;
pub mod manager;
pub mod typed;

pub use directory::{sort_objects, DirectoryEntry};
pub use keyed::KeyedCache;
pub use manager::{CacheManager, CachedLink, UserRecord};
pub use typed::TypedCache;

/// Hooks a cached value can use to take part in its own eviction
pub trait Evict {
    /// Pinned values are neither treated as expired nor evicted
    fn is_pinned(&self) -> bool {
        false
    }

    /// Called once the value has left the cache (evicted, deleted or replaced)
    fn evicted(&self) {}
}
