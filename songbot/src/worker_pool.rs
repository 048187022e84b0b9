//! Bounded worker pool for search and download jobs
//!
//! At most `workers` jobs run at once and at most `queue_depth` more may wait
//! for a slot. Anything beyond that is rejected immediately with
//! [`PoolError::Saturated`] instead of piling up.
//!
//! Jobs run as their own tasks and hold their slot until they finish, even if
//! the caller stops waiting. In-flight downloads are never cancelled.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, error};

/// Worker pool errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every worker is busy and the wait queue is full
    #[error("Worker pool is saturated")]
    Saturated,

    /// Pool is shutting down
    #[error("Worker pool is shutting down")]
    Closed,

    /// Job panicked
    #[error("Job {0} panicked")]
    Panicked(String),
}

/// Fixed-size job pool with admission control
#[derive(Clone)]
pub struct WorkerPool {
    /// One permit per running job
    workers: Arc<Semaphore>,
    /// One permit per running or waiting job
    admission: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let capacity = workers + queue_depth;

        debug!(workers, queue_depth, "Worker pool created");

        Self {
            workers: Arc::new(Semaphore::new(workers)),
            admission: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Jobs currently running or waiting
    pub fn pending(&self) -> usize {
        self.capacity - self.admission.available_permits()
    }

    /// Run `job` on the pool and wait for its output
    pub async fn run<F, T>(&self, name: &str, job: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let admitted = Arc::clone(&self.admission)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => PoolError::Saturated,
                TryAcquireError::Closed => PoolError::Closed,
            })?;

        let workers = Arc::clone(&self.workers);
        let handle = tokio::spawn(async move {
            let _admitted = admitted;
            let _slot = workers.acquire_owned().await.map_err(|_| PoolError::Closed)?;
            Ok(job.await)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(job = name, "Pool job failed: {}", e);
                Err(PoolError::Panicked(name.to_string()))
            }
        }
    }

    /// Reject all future jobs; running ones finish normally
    pub fn close(&self) {
        self.admission.close();
        self.workers.close();
    }
}
