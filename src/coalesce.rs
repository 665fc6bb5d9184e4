//! Request coalescing
//!
//! Concurrent callers asking for the same key share a single in-flight backend
//! call. The call runs in its own task, so it is not tied to the cancellation
//! of whichever caller happened to start it: dropping one waiter never cancels
//! the shared call or the other waiters.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{FsError, Result};

type SharedCall<T> = Shared<BoxFuture<'static, Result<T>>>;

struct InFlight<T> {
    id: u64,
    call: SharedCall<T>,
}

/// Shares one in-flight call per key among concurrent callers
pub struct Group<T> {
    calls: Arc<Mutex<HashMap<String, InFlight<T>>>>,
    next_id: AtomicU64,
}

impl<T> Group<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `f` for `key`, or join the call already in flight for it
    ///
    /// Every caller sharing a call observes the same result, success or error.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.join_or_start(key, f).0.await
    }

    /// Like [`run`](Self::run), but a caller whose validator rejects a result
    /// produced for someone else fetches again on its own
    pub async fn run_validated<F, Fut, V>(&self, key: &str, f: F, validate: V) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        V: Fn(&T) -> bool,
    {
        let (call, leader) = self.join_or_start(key, &f);
        let value = call.await?;
        if leader || validate(&value) {
            return Ok(value);
        }
        debug!("shared result for {} rejected by caller, fetching again", key);
        f().await
    }

    /// Number of keys with a call in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn join_or_start<F, Fut>(&self, key: &str, f: F) -> (SharedCall<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut calls = self.calls.lock();
        if let Some(in_flight) = calls.get(key) {
            trace!("joining in-flight call for {}", key);
            return (in_flight.call.clone(), false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.calls);
        let owned_key = key.to_string();
        let fut = f();
        let task = tokio::spawn(async move {
            // Release the slot even if the call panics; a later caller must
            // start a fresh call rather than join a finished one.
            scopeguard::defer! {
                let mut calls = registry.lock();
                if calls.get(&owned_key).is_some_and(|c| c.id == id) {
                    calls.remove(&owned_key);
                }
            }
            fut.await
        });

        let call = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(FsError::Backend(format!("shared call failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        calls.insert(
            key.to_string(),
            InFlight {
                id,
                call: call.clone(),
            },
        );
        (call, true)
    }
}

impl<T> Default for Group<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
