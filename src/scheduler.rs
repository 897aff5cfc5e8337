//! Cancellable delayed tasks and keyed debouncing
//!
//! [`Scheduler::schedule`] returns a [`TaskHandle`] that can cancel the task
//! before its delay elapses. [`Debouncer`] keeps at most one pending task per
//! key: scheduling again for a key cancels the previous task first, so only
//! the last call in a burst runs (trailing edge).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::ObserverError;

/// Work run once a delay elapses
pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Prevent the task from running; no effect once it fired
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task already ran
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Still waiting for its delay
    pub fn is_pending(&self) -> bool {
        !self.has_fired() && !self.is_cancelled()
    }

    /// Run `task` unless the handle was cancelled in the meantime
    pub fn fire(&self, task: ScheduledTask) {
        if self.is_cancelled() {
            return;
        }
        self.fired.store(true, Ordering::Release);
        task();
    }

    pub fn cancelled_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Source of delayed execution
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TaskHandle;
}

/// Scheduler driven by tokio timers
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
    tracker: TaskTracker,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tracker: TaskTracker::new(),
        }
    }

    /// Bind to the runtime the caller is running on
    pub fn current() -> Result<Self, ObserverError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ObserverError::Runtime(e.to_string()))
    }

    /// Number of timers still alive (pending or running)
    pub fn live_tasks(&self) -> usize {
        self.tracker.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TaskHandle {
        let handle = TaskHandle::new();
        let runner = handle.clone();
        let cancelled = handle.cancelled_token();

        self.tracker.spawn_on(
            async move {
                tokio::select! {
                    _ = cancelled.cancelled() => {}
                    _ = tokio::time::sleep(delay) => runner.fire(task),
                }
            },
            &self.handle,
        );

        handle
    }
}

/// Trailing-edge debouncer with one pending task per key
pub struct Debouncer<K> {
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    pending: Mutex<HashMap<K, TaskHandle>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash,
{
    pub fn new(scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            scheduler,
            delay,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `task` for `key`, cancelling whatever was pending for it
    pub fn call<F>(&self, key: K, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.lock();
        if let Some(previous) = pending.remove(&key) {
            previous.cancel();
        }
        let handle = self.scheduler.schedule(self.delay, Box::new(task));
        pending.insert(key, handle);
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.lock().get(key).is_some_and(TaskHandle::is_pending)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().values().filter(|h| h.is_pending()).count()
    }

    pub fn cancel_all(&self) {
        for (_, handle) in self.lock().drain() {
            handle.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, TaskHandle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in pending.drain() {
            handle.cancel();
        }
    }
}
