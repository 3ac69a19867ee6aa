//! Bounded-concurrency gate for fanning out independent fetches.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::trace;

pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Default)]
struct LimiterState {
    running: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Runs at most `concurrency` tasks at a time; waiting tasks start in the
/// order they were added.
pub struct RequestLimiter {
    concurrency: usize,
    state: Mutex<LimiterState>,
}

impl Default for RequestLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl RequestLimiter {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            state: Mutex::new(LimiterState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn running(&self) -> usize {
        self.lock().running
    }

    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Waits for a free slot, then runs `task` while holding it.
    pub async fn add<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.acquire().await;
        task().await
    }

    async fn acquire(&self) -> Slot<'_> {
        let receiver = {
            let mut state = self.lock();
            if state.running < self.concurrency && state.waiters.is_empty() {
                state.running += 1;
                return Slot { limiter: self };
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            trace!(queued = state.waiters.len(), "Task queued behind limiter");
            receiver
        };

        let mut waiter = Waiter {
            limiter: self,
            receiver: Some(receiver),
        };
        if let Some(receiver) = waiter.receiver.as_mut() {
            // The sender is only dropped by `release`, after a successful handoff
            // attempt, or together with the limiter itself.
            let _ = receiver.await;
        }
        waiter.receiver = None;
        Slot { limiter: self }
    }

    /// Hands the slot to the next live waiter, or frees it.
    fn release(&self) {
        let mut state = self.lock();
        while let Some(next) = state.waiters.pop_front() {
            if next.send(()).is_ok() {
                return;
            }
        }
        state.running = state.running.saturating_sub(1);
    }
}

/// An occupied slot; released on drop.
struct Slot<'a> {
    limiter: &'a RequestLimiter,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

/// A queued acquisition. If it is dropped after a slot was handed to it but
/// before it could take the slot, the slot is passed on.
struct Waiter<'a> {
    limiter: &'a RequestLimiter,
    receiver: Option<oneshot::Receiver<()>>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            if receiver.try_recv().is_ok() {
                self.limiter.release();
            }
        }
    }
}

/// Maps every item through `handler` with at most `limit` handlers running at
/// once. Results come back in input order; the first error fails the batch.
pub async fn batch_process<I, T, F, Fut, R, E>(items: I, handler: F, limit: usize) -> Result<Vec<R>, E>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let limiter = RequestLimiter::new(limit);
    let tasks = items.into_iter().map(|item| {
        let task = handler(item);
        limiter.add(move || task)
    });
    futures::future::try_join_all(tasks).await
}
