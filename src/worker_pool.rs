//! Shared bounded worker pool for generation/flush/cancel tasks.
//!
//! Stands in for the teacher's module-level thread-pool executor, but
//! sized and owned per agent instance rather than a process-wide
//! `static`, so multiple agents in the same process (or a test harness)
//! never contend over one another's capacity.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A capacity-bounded pool of tokio tasks.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Build a pool that allows at most `capacity` tasks to run at once.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Spawn `future` once a permit is available. The permit is held for
    /// the lifetime of the task.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        tokio::task::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("worker pool semaphore closed");
            future.await
        })
    }
}
