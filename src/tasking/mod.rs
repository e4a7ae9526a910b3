//! Scheduling abstraction shared by every component that needs to spawn background work:
//! the socket queue's reader/writer loops, request handlers, and batch fan-out.
//!
//! [`Tasking`] is constructed once per endpoint with a [`ThreadingModel`] and a set of named
//! concurrency quotas, and offers the same `spawn`/`queue`/`semaphore`/`promise` primitives
//! regardless of which model was chosen. Threads mode schedules work onto tokio's multi-thread
//! runtime via [`tokio::spawn`]; cooperative mode schedules the same futures onto a single OS
//! thread via [`tokio::task::spawn_local`], and expects the caller to be driving a `LocalSet`.
//! Results of spawned work are never returned through the join handle — they flow back through
//! a [`Promise`] or a channel — so every task this abstraction tracks has output `()`, which is
//! what lets [`Tasking::join`] wait on all of them uniformly regardless of model.

mod promise;

pub use promise::Promise;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::error::{Error, Result};
use crate::core::options::{TaskQuotas, ThreadingModel};

/// Named concurrency groups a [`Tasking`] enforces quotas for.
pub const GROUP_DISPATCHER: &str = "dispatcher";
pub const GROUP_HANDLERS: &str = "handlers";
pub const GROUP_BATCHES: &str = "batches";

#[derive(Clone)]
pub struct Tasking {
    model: ThreadingModel,
    quotas: Arc<HashMap<&'static str, Arc<Semaphore>>>,
    active: Arc<parking_lot::Mutex<JoinSet<()>>>,
}

impl Tasking {
    pub fn new(model: ThreadingModel, quotas: TaskQuotas) -> Self {
        let mut map = HashMap::new();
        if let Some(n) = quotas.dispatcher {
            map.insert(GROUP_DISPATCHER, Arc::new(Semaphore::new(n)));
        }
        if let Some(n) = quotas.handlers {
            map.insert(GROUP_HANDLERS, Arc::new(Semaphore::new(n)));
        }
        if let Some(n) = quotas.batches {
            map.insert(GROUP_BATCHES, Arc::new(Semaphore::new(n)));
        }
        Self {
            model,
            quotas: Arc::new(map),
            active: Arc::new(parking_lot::Mutex::new(JoinSet::new())),
        }
    }

    pub fn model(&self) -> ThreadingModel {
        self.model
    }

    /// Spawns `fut` onto whichever scheduling model this `Tasking` was built with, under the
    /// named quota group (if any quota was configured for it). The task is registered so that
    /// [`Self::join`] will wait for it.
    pub fn spawn<F>(&self, group: &'static str, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let permit = self.quotas.get(group).cloned();
        let guarded = async move {
            let _permit = match permit {
                Some(sem) => Some(sem.acquire_owned().await.expect("semaphore never closed")),
                None => None,
            };
            fut.await
        };

        let mut active = self.active.lock();
        match self.model {
            ThreadingModel::Threads => {
                active.spawn(guarded);
            }
            ThreadingModel::Cooperative => {
                active.spawn_local(guarded);
            }
        }
    }

    /// Waits for every task spawned so far to finish, or for `timeout` to elapse.
    pub async fn join(&self, timeout: Option<Duration>) -> Result<()> {
        let wait_all = async {
            loop {
                let next = {
                    let mut active = self.active.lock();
                    // JoinSet::join_next needs &mut self and is not safe to hold the sync lock
                    // across an await point, so take ownership of polling one future at a time.
                    if active.is_empty() {
                        None
                    } else {
                        Some(())
                    }
                };
                if next.is_none() {
                    break;
                }
                let joined = {
                    let mut active = self.active.lock();
                    active.try_join_next()
                };
                match joined {
                    Some(Ok(())) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "spawned task ended abnormally");
                        continue;
                    }
                    None => tokio::task::yield_now().await,
                }
            }
        };

        match timeout {
            Some(d) => tokio::time::timeout(d, wait_all)
                .await
                .map_err(|_| Error::Timeout(d)),
            None => {
                wait_all.await;
                Ok(())
            }
        }
    }

    /// A fresh one-shot promise, settled by exactly one `set` call (later calls are logged and
    /// discarded) and awaited by exactly one `wait` call.
    pub fn new_promise<T>(&self) -> Promise<T> {
        Promise::new()
    }

    /// A fresh counting semaphore, independent of the per-group quotas above.
    pub fn new_semaphore(&self, permits: usize) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(permits))
    }

    /// A fresh unbounded mpsc queue.
    pub fn new_queue<T: Send + 'static>(
        &self,
    ) -> (
        tokio::sync::mpsc::UnboundedSender<T>,
        tokio::sync::mpsc::UnboundedReceiver<T>,
    ) {
        tokio::sync::mpsc::unbounded_channel()
    }
}
