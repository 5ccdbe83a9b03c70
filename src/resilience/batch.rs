use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::telemetry;
use crate::{HeimdallError, Result};

/// When a pending batch is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Items per call. Default: 10.
    pub max_batch: usize,
    /// How long the first item of a batch waits for company. Default: 1s.
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

impl BatchConfig {
    pub fn new(max_batch: usize) -> Self {
        Self {
            max_batch: max_batch.max(1),
            max_wait: Duration::from_secs(1),
        }
    }

    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }
}

type Pending<I, O> = (I, oneshot::Sender<Result<O>>);

/// Coalesces single-item calls into batched calls.
///
/// Items submitted from any number of tasks are queued to one background
/// task, which hands them to the batch function once `max_batch` are
/// waiting or `max_wait` has passed since the first. Each caller gets the
/// output at its own position. Batches run one at a time.
///
/// The background task ends once every handle is dropped.
pub struct BatchCoalescer<I, O> {
    name: Arc<str>,
    tx: mpsc::Sender<Pending<I, O>>,
}

impl<I, O> Clone for BatchCoalescer<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
        }
    }
}

impl<I, O> fmt::Debug for BatchCoalescer<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCoalescer")
            .field("name", &self.name)
            .finish()
    }
}

impl<I, O> BatchCoalescer<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Start the background task. Must be called inside a tokio runtime.
    ///
    /// `f` must return exactly one output per input, in input order.
    pub fn spawn<F, Fut>(name: impl Into<String>, config: BatchConfig, f: F) -> Self
    where
        F: Fn(Vec<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<O>>> + Send + 'static,
    {
        let name: Arc<str> = Arc::from(name.into());
        let max_batch = config.max_batch.max(1);
        let (tx, rx) = mpsc::channel(max_batch * 4);
        tokio::spawn(run(Arc::clone(&name), max_batch, config.max_wait, rx, f));
        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue one item and wait for its share of the batch result.
    pub async fn submit(&self, item: I) -> Result<O> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send((item, reply))
            .await
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    fn stopped(&self) -> HeimdallError {
        HeimdallError::Internal(format!("batch coalescer {} stopped", self.name))
    }
}

async fn run<I, O, F, Fut>(
    name: Arc<str>,
    max_batch: usize,
    max_wait: Duration,
    mut rx: mpsc::Receiver<Pending<I, O>>,
    f: F,
) where
    F: Fn(Vec<I>) -> Fut,
    Fut: Future<Output = Result<Vec<O>>>,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(max_batch);
        batch.push(first);

        let deadline = tokio::time::sleep(max_wait);
        tokio::pin!(deadline);
        while batch.len() < max_batch {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(pending) => batch.push(pending),
                    None => break,
                },
                () = &mut deadline => break,
            }
        }

        flush(&name, batch, &f).await;
    }
    debug!(batch = %name, "batch coalescer stopped");
}

async fn flush<I, O, F, Fut>(name: &str, batch: Vec<Pending<I, O>>, f: &F)
where
    F: Fn(Vec<I>) -> Fut,
    Fut: Future<Output = Result<Vec<O>>>,
{
    let size = batch.len();
    let mut items = Vec::with_capacity(size);
    let mut replies = Vec::with_capacity(size);
    for (item, reply) in batch {
        items.push(item);
        replies.push(reply);
    }

    metrics::histogram!(telemetry::BATCH_SIZE, "batch" => name.to_owned()).record(size as f64);
    debug!(batch = name, size, "flushing batch");

    let message = match f(items).await {
        Ok(outputs) if outputs.len() == size => {
            for (reply, output) in replies.into_iter().zip(outputs) {
                // Err means the caller stopped waiting.
                let _ = reply.send(Ok(output));
            }
            return;
        }
        Ok(outputs) => format!("returned {} results for {size} items", outputs.len()),
        Err(e) => e.to_string(),
    };

    warn!(batch = name, size, error = %message, "batch failed");
    for reply in replies {
        let _ = reply.send(Err(HeimdallError::Upstream {
            provider: name.to_owned(),
            message: message.clone(),
        }));
    }
}
