//! Single-slot FIFO queues for work that shares one global name.

use std::fmt::Display;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Runs queued tasks strictly one at a time, in enqueue order.
///
/// A failed task only affects its own caller; the next task starts as soon as
/// it settles.
pub struct SerialQueue {
    name: &'static str,
    slot: Mutex<()>,
}

impl SerialQueue {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(()),
        }
    }

    pub async fn enqueue<F, Fut, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let _slot = self.slot.lock().await;
        debug!(queue = self.name, "Running queued task");
        let result = task().await;
        if let Err(e) = &result {
            warn!(queue = self.name, error = %e, "Queued task failed");
        }
        result
    }
}
