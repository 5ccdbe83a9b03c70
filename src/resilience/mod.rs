//! Combinators that harden calls into the retrieval/inference pipeline.
//!
//! Each one is an explicit higher-order function (or a small owned
//! resource) parameterised by a policy value:
//!
//! - [`retry`] / [`retry_if`]: exponential backoff per [`RetryConfig`]
//! - [`with_timeout`]: upper bound on one unit of work
//! - [`gather_bounded`] / [`try_gather_bounded`]: order-preserving fan-out
//! - [`ConnectionPool`]: bounded pool of externally created resources
//! - [`WorkerPool`]: CPU-bound closures on tokio's blocking threads
//! - [`BatchCoalescer`]: single-item calls grouped into batched calls

mod batch;
mod fanout;
mod pool;
mod retry;
mod timeout;
mod worker;

pub use batch::{BatchCoalescer, BatchConfig};
pub use fanout::{FailurePolicy, gather_bounded, try_gather_bounded};
pub use pool::{ConnectionPool, ManageConnection, PoolConfig, PoolStatus, PooledConnection};
pub use retry::{RetryConfig, retry, retry_if};
pub use timeout::with_timeout;
pub use worker::WorkerPool;
