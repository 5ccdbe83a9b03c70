use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::{HeimdallError, Result};

/// Bounded pool for CPU-bound work.
///
/// Closures run on tokio's blocking threads, at most `threads` at a time.
/// A slot stays occupied until the closure returns, even if the caller
/// stopped waiting for it.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    threads: usize,
}

impl WorkerPool {
    /// Pool running at most `threads` closures at once (minimum 1).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            permits: Arc::new(Semaphore::new(threads)),
            threads,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Slots not currently running a closure.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `f` on a worker, waiting for a free slot first.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HeimdallError::Internal("worker pool closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| HeimdallError::Internal(format!("worker task failed: {e}")))
    }

    /// [`run`](Self::run) for closures that can fail themselves.
    pub async fn try_run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run(f).await?
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}
