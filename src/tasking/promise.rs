use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::error::{Error, Result};

/// A value settled at most once and awaited by exactly one waiter.
///
/// `set` is idempotent: a second call is logged and the value is dropped rather than panicking,
/// since a handler racing a timeout deregistration against a late response is an expected
/// outcome, not a bug.
pub struct Promise<T> {
    tx: Mutex<Option<oneshot::Sender<T>>>,
    rx: Mutex<Option<oneshot::Receiver<T>>>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    pub fn set(&self, value: T) {
        let sender = self.tx.lock().take();
        match sender {
            Some(tx) => {
                let _ = tx.send(value);
            }
            None => tracing::warn!("promise already settled; dropping duplicate value"),
        }
    }

    /// Waits for the value, or for `timeout` to elapse if given.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<T> {
        let rx = self
            .rx
            .lock()
            .take()
            .expect("a promise has exactly one waiter");
        match timeout {
            Some(d) => match tokio::time::timeout(d, rx).await {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(_)) => Err(Error::Closed),
                Err(_) => Err(Error::Timeout(d)),
            },
            None => rx.await.map_err(|_| Error::Closed),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}
