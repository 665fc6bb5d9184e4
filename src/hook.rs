//! Update hooks
//!
//! Subscribers are told about every fresh listing and every structural
//! mutation. Delivery is fire-and-forget: each subscriber runs in its own
//! detached task, so neither a slow subscriber nor the cancellation of the
//! triggering request affects the other.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, trace, warn};

use crate::error::Result;
use crate::model::Obj;

/// Receives (full path, objects) after listings and mutations
#[async_trait]
pub trait UpdateSubscriber: Send + Sync {
    /// Name used in logs and for unregistering
    fn name(&self) -> &str;

    async fn on_update(&self, path: &str, objs: &[Obj]) -> Result<()>;
}

/// Registration point and fan-out for update subscribers
#[derive(Default)]
pub struct HookRegistry {
    subscribers: RwLock<Vec<Arc<dyn UpdateSubscriber>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: Arc<dyn UpdateSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.name() != name);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Notify every subscriber without waiting for any of them
    pub fn dispatch(&self, path: &str, objs: Vec<Obj>) {
        let subscribers = self.subscribers.read().clone();
        if subscribers.is_empty() {
            return;
        }
        trace!("dispatching update for {} to {} subscribers", path, subscribers.len());
        let objs: Arc<[Obj]> = objs.into();
        for subscriber in subscribers {
            let path = path.to_string();
            let objs = Arc::clone(&objs);
            tokio::spawn(async move {
                if let Err(e) = subscriber.on_update(&path, &objs).await {
                    warn!(
                        "Update hook {} failed for {}: {}",
                        subscriber.name(),
                        path,
                        e
                    );
                }
            });
        }
    }
}

/// Subscriber that logs every update
pub struct LogSubscriber;

#[async_trait]
impl UpdateSubscriber for LogSubscriber {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_update(&self, path: &str, objs: &[Obj]) -> Result<()> {
        info!("updated {} ({} objects)", path, objs.len());
        Ok(())
    }
}
