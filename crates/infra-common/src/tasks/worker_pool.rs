//! Bounded worker pool for tracked, cancellable async work
//!
//! Every piece of protocol work in the adapter (reply handlers, timeout
//! callbacks, scheduled retries) runs on a [`WorkerPool`] instead of being
//! spawned ad hoc. The pool gives three guarantees:
//!
//! ```text
//!   spawn / spawn_after
//!          │
//!          ▼
//!   ┌──────────────┐  delay (no permit held)  ┌─────────────┐
//!   │ TaskTracker  │ ───────────────────────▶ │  Semaphore  │ ── permit ──▶ run
//!   └──────────────┘                          └─────────────┘
//!          ▲                                          │
//!          └──────────── CancellationToken ───────────┘
//! ```
//!
//! - at most `max_concurrent` futures execute at once,
//! - a delayed task sleeps without occupying a slot, and can be aborted
//!   through its own token before it runs,
//! - `shutdown()` cancels everything and waits (bounded) for tasks to drain.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::errors::types::{Error, Result};

/// Snapshot of pool activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub name: String,
    /// Futures currently holding a permit
    pub active: usize,
    /// Tasks that are sleeping or waiting for a permit
    pub waiting: usize,
    pub max_concurrent: usize,
    pub shutdown: bool,
}

struct PoolInner {
    name: String,
    handle: Handle,
    tracker: TaskTracker,
    cancel_token: CancellationToken,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    next_task_id: AtomicUsize,
    active_count: AtomicUsize,
    shutdown_timeout: Duration,
}

/// Cheap-to-clone handle to a shared worker pool
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("active", &self.active_count())
            .field("max_concurrent", &self.inner.max_concurrent)
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool bound to the current tokio runtime
    ///
    /// # Arguments
    /// * `name` - Pool name used in log lines
    /// * `max_concurrent` - Maximum number of futures running at once (at least 1)
    /// * `shutdown_timeout` - How long [`WorkerPool::shutdown`] waits for tasks to drain
    ///
    /// # Returns
    /// [`Error::Runtime`] when called outside a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        max_concurrent: usize,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        let max_concurrent = max_concurrent.max(1);

        Ok(Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                handle,
                tracker: TaskTracker::new(),
                cancel_token: CancellationToken::new(),
                permits: Arc::new(Semaphore::new(max_concurrent)),
                max_concurrent,
                next_task_id: AtomicUsize::new(0),
                active_count: AtomicUsize::new(0),
                shutdown_timeout,
            }),
        })
    }

    /// Run `future` as soon as a slot is free
    ///
    /// Returns the task id, or [`Error::PoolShutdown`] once the pool is closed.
    pub fn spawn<F>(&self, name: &str, future: F) -> Result<usize>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_inner(name, None, None, future)
    }

    /// Run `future` after `delay`; the wait does not occupy a slot
    pub fn spawn_after<F>(&self, name: &str, delay: Duration, future: F) -> Result<usize>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_inner(name, Some(delay), None, future)
    }

    /// Like [`spawn_after`](Self::spawn_after), but dropped as soon as `abort`
    /// is cancelled while the delay is still running
    pub fn spawn_after_unless<F>(
        &self,
        name: &str,
        delay: Duration,
        abort: CancellationToken,
        future: F,
    ) -> Result<usize>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_inner(name, Some(delay), Some(abort), future)
    }

    fn spawn_inner<F>(
        &self,
        name: &str,
        delay: Option<Duration>,
        abort: Option<CancellationToken>,
        future: F,
    ) -> Result<usize>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(Error::PoolShutdown(self.inner.name.clone()));
        }

        let task_id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        let task_name = name.to_string();
        let inner = self.inner.clone();

        let wrapped = async move {
            let cancel = inner.cancel_token.clone();

            if let Some(delay) = delay {
                let aborted = async {
                    match &abort {
                        Some(abort) => abort.cancelled().await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => {
                        trace!("Task {} [{}] cancelled while waiting in pool {}", task_name, task_id, inner.name);
                        return;
                    }
                    _ = aborted => {
                        trace!("Task {} [{}] aborted while waiting in pool {}", task_name, task_id, inner.name);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let permit = tokio::select! {
                permit = inner.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = cancel.cancelled() => return,
            };

            inner.active_count.fetch_add(1, Ordering::Relaxed);
            trace!("Task started: {} [{}] in pool {}", task_name, task_id, inner.name);

            tokio::select! {
                _ = future => {
                    trace!("Task completed: {} [{}] in pool {}", task_name, task_id, inner.name);
                }
                _ = cancel.cancelled() => {
                    debug!("Task cancelled: {} [{}] in pool {}", task_name, task_id, inner.name);
                }
            }

            inner.active_count.fetch_sub(1, Ordering::Relaxed);
            drop(permit);
        };

        self.inner.tracker.spawn_on(wrapped, &self.inner.handle);
        Ok(task_id)
    }

    /// Number of futures currently running
    pub fn active_count(&self) -> usize {
        self.inner.active_count.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }

    pub fn stats(&self) -> PoolStats {
        let active = self.active_count();
        PoolStats {
            name: self.inner.name.clone(),
            active,
            waiting: self.inner.tracker.len().saturating_sub(active),
            max_concurrent: self.inner.max_concurrent,
            shutdown: self.is_shutdown(),
        }
    }

    /// Cancel all tasks and wait up to the shutdown timeout for them to finish
    pub async fn shutdown(&self) -> Result<()> {
        debug!(
            "Shutting down pool {} with {} tracked tasks",
            self.inner.name,
            self.inner.tracker.len()
        );

        self.inner.cancel_token.cancel();
        self.inner.permits.close();
        self.inner.tracker.close();

        match tokio::time::timeout(self.inner.shutdown_timeout, self.inner.tracker.wait()).await {
            Ok(()) => {
                debug!("Pool {} drained", self.inner.name);
            }
            Err(_) => {
                warn!(
                    "Pool {} shutdown timed out after {:?} with {} tasks left",
                    self.inner.name,
                    self.inner.shutdown_timeout,
                    self.inner.tracker.len()
                );
            }
        }

        Ok(())
    }
}
