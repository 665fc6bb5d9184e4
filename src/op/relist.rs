//! Background re-listing of a subtree after a folder move or copy
//!
//! Every walk gets a generation number. Starting a new walk for the same
//! root supersedes the old one, which stops before its next listing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::Dispatcher;
use crate::cache::CacheManager;
use crate::model::ListArgs;
use crate::path;
use crate::storage::Storage;

/// Re-list settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelistConfig {
    pub enabled: bool,
    /// Listings per second; 0 means unpaced
    pub rate_limit: u32,
}

impl Default for RelistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_limit: 2,
        }
    }
}

pub(super) struct Relister {
    config: RelistConfig,
    generations: DashMap<String, u64>,
    next_generation: AtomicU64,
}

impl Relister {
    pub(super) fn new(config: RelistConfig) -> Self {
        Self {
            config,
            generations: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Start walking `root`, superseding any walk already running for it
    pub(super) fn schedule(
        &self,
        dispatcher: &Dispatcher,
        storage: &Arc<Storage>,
        root: &str,
    ) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }
        let key = CacheManager::key(storage, root);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = self.generations.insert(key.clone(), generation) {
            debug!("re-list of {} superseded (generation {})", key, previous);
        }

        let pace = match self.config.rate_limit {
            0 => None,
            rate => Some(Duration::from_secs(1) / rate),
        };
        Some(tokio::spawn(dispatcher.clone().walk(
            Arc::clone(storage),
            root.to_string(),
            key,
            generation,
            pace,
        )))
    }

    fn is_current(&self, key: &str, generation: u64) -> bool {
        self.generations
            .get(key)
            .is_some_and(|current| *current == generation)
    }

    fn finish(&self, key: &str, generation: u64) {
        self.generations
            .remove_if(key, |_, current| *current == generation);
    }
}

impl Dispatcher {
    /// Breadth-first refresh of every directory under `root`
    async fn walk(
        self,
        storage: Arc<Storage>,
        root: String,
        key: String,
        generation: u64,
        pace: Option<Duration>,
    ) {
        let mut ticker = pace.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut queue = VecDeque::from([root]);
        let mut visited = 0usize;

        while let Some(dir_path) = queue.pop_front() {
            if let Some(ticker) = ticker.as_mut() {
                ticker.tick().await;
            }
            if !self.relist.is_current(&key, generation) {
                debug!("abandoning re-list of {} after {} directories", key, visited);
                return;
            }

            let args = ListArgs {
                refresh: true,
                ..Default::default()
            };
            match self.list_dir(&storage, &dir_path, args, None).await {
                Ok(objs) => queue.extend(
                    objs.into_iter()
                        .filter(|obj| obj.is_dir)
                        .map(|obj| path::join(&dir_path, &obj.name)),
                ),
                Err(e) => warn!(
                    "Re-list of {} failed: {}",
                    CacheManager::key(&storage, &dir_path),
                    e
                ),
            }
            visited += 1;
        }

        debug!("re-listed {} directories under {}", visited, key);
        self.relist.finish(&key, generation);
    }
}
