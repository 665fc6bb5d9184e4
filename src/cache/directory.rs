//! Cached listing of one directory
//!
//! Holds the unordered object list plus a lazily rebuilt sorted view. Each
//! entry carries its own lock so unrelated directories never contend.

use std::cmp::Ordering;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::driver::{ExtractFolder, OrderBy, OrderDirection, StorageConfig};
use crate::model::Obj;

#[derive(Debug)]
struct Listing {
    objs: Vec<Obj>,
    sorted: Vec<Obj>,
    dirty: bool,
}

/// Authoritative object list for one (storage, directory)
#[derive(Debug)]
pub struct DirectoryEntry {
    listing: RwLock<Listing>,
}

impl DirectoryEntry {
    /// Build an entry from a backend listing, keeping the last object per name
    pub fn new(objs: Vec<Obj>) -> Self {
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(objs.len());
        let mut unique: Vec<Obj> = Vec::with_capacity(objs.len());
        for obj in objs {
            match positions.get(&obj.name) {
                Some(&i) => unique[i] = obj,
                None => {
                    positions.insert(obj.name.clone(), unique.len());
                    unique.push(obj);
                }
            }
        }
        Self {
            listing: RwLock::new(Listing {
                objs: unique,
                sorted: Vec::new(),
                dirty: true,
            }),
        }
    }

    /// Unordered snapshot of the listing
    pub fn objects(&self) -> Vec<Obj> {
        self.listing.read().objs.clone()
    }

    pub fn find(&self, name: &str) -> Option<Obj> {
        self.listing
            .read()
            .objs
            .iter()
            .find(|o| o.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.listing.read().objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listing.read().objs.is_empty()
    }

    /// Remove an object by name
    pub fn remove_object(&self, name: &str) -> bool {
        let mut listing = self.listing.write();
        let before = listing.objs.len();
        listing.objs.retain(|o| o.name != name);
        let removed = listing.objs.len() != before;
        if removed {
            listing.dirty = true;
        }
        removed
    }

    /// Replace the object known as `old_name` (or `new.name`), or append it
    ///
    /// Any other object already holding the new name is dropped so names stay
    /// unique within the directory.
    pub fn update_object(&self, old_name: Option<&str>, new: Obj) {
        let mut listing = self.listing.write();
        let target = old_name.unwrap_or(&new.name).to_string();
        let new_name = new.name.clone();
        if target != new_name {
            listing.objs.retain(|o| o.name != new_name);
        }
        match listing.objs.iter_mut().find(|o| o.name == target) {
            Some(existing) => *existing = new,
            None => listing.objs.push(new),
        }
        listing.dirty = true;
    }

    /// Listing ordered per the storage's sort configuration
    ///
    /// Rebuilt only when the object list changed since the last call.
    pub fn sorted_objects(&self, config: &StorageConfig) -> Vec<Obj> {
        {
            let listing = self.listing.read();
            if !listing.dirty {
                return listing.sorted.clone();
            }
        }
        let mut listing = self.listing.write();
        if listing.dirty {
            let mut sorted = listing.objs.clone();
            sort_objects(&mut sorted, config);
            listing.sorted = sorted;
            listing.dirty = false;
        }
        listing.sorted.clone()
    }
}

/// Apply local sorting and folder extraction to a listing in place
pub fn sort_objects(objs: &mut [Obj], config: &StorageConfig) {
    if config.local_sort {
        if let Some(order_by) = config.order_by {
            objs.sort_by(|a, b| {
                let ord = compare(a, b, order_by);
                match config.order_direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                }
            });
        }
    }
    match config.extract_folder {
        ExtractFolder::None => {}
        ExtractFolder::Front => objs.sort_by_key(|o| !o.is_dir),
        ExtractFolder::Back => objs.sort_by_key(|o| o.is_dir),
    }
}

fn compare(a: &Obj, b: &Obj, order_by: OrderBy) -> Ordering {
    match order_by {
        OrderBy::Name => a.name.cmp(&b.name),
        OrderBy::Size => a.size.cmp(&b.size),
        OrderBy::Modified => a.modified.cmp(&b.modified),
    }
}
