//! Bounded worker pool for blocking work.
//!
//! Blocking work functions are offloaded here so the cooperative scheduler
//! never stalls. The pool bounds concurrent jobs with a semaphore and bounds
//! the waiting queue with an admission cap; past both it rejects with
//! [`FlowError::PoolSaturated`] instead of growing unbounded.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{FlowError, FlowResult};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum blocking jobs running at once.
    pub max_workers: usize,
    /// Maximum jobs allowed to wait for a worker before admission fails.
    pub max_queue: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 16,
            max_queue: 256,
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    pub max_workers: usize,
    pub in_flight: usize,
    pub waiting: usize,
    pub completed: u64,
    pub rejected: u64,
}

/// Bounded pool running blocking jobs on the runtime's blocking threads.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    config: WorkerPoolConfig,
    waiting: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
}

struct WaitGuard<'a>(&'a AtomicUsize);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::with_config(WorkerPoolConfig::default())
    }

    pub fn with_config(config: WorkerPoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers.max(1))),
            config,
            waiting: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Run `job` on a worker thread, suspending the caller until it
    /// completes. Fails with `PoolSaturated` when both the workers and the
    /// waiting queue are full. If the caller stops waiting (deadline), the
    /// job keeps running to completion in the background and its result is
    /// discarded; the worker slot is released when it finishes.
    pub async fn run<T, F>(&self, job: F) -> FlowResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                if self.waiting.fetch_add(1, Ordering::AcqRel) >= self.config.max_queue {
                    self.waiting.fetch_sub(1, Ordering::AcqRel);
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    debug!(max_queue = self.config.max_queue, "worker pool saturated");
                    return Err(FlowError::PoolSaturated);
                }
                let _guard = WaitGuard(&self.waiting);
                Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| FlowError::Internal("worker pool closed".to_string()))?
            }
        };

        let handle = tokio::task::spawn_blocking(move || {
            let out = job();
            drop(permit);
            out
        });

        match handle.await {
            Ok(out) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                Ok(out)
            }
            Err(join_err) => Err(FlowError::Internal(format!(
                "blocking work aborted: {join_err}"
            ))),
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let max_workers = self.config.max_workers.max(1);
        WorkerPoolStats {
            max_workers,
            in_flight: max_workers.saturating_sub(self.semaphore.available_permits()),
            waiting: self.waiting.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
