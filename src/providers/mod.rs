//! Embedding providers and their decorators.
//!
//! The control plane never computes embeddings itself. It wraps whatever
//! computes them:
//!
//! - [`CachedEmbeddingProvider`]: read-through cache with batch splitting
//! - [`RetryingEmbeddingProvider`]: retry with backoff on transient errors
//! - [`WorkerEmbeddingProvider`]: runs a blocking embedding function on a
//!   [`WorkerPool`](crate::resilience::WorkerPool)
//! - [`BatchingEmbeddingProvider`]: groups concurrent single-text calls into
//!   batch calls
//!
//! Decorators compose; the usual stack is cached → retrying → worker, so
//! cache hits skip both retry and the worker pool.

pub mod batching;
pub mod cached;
pub mod retry;
pub mod traits;
pub mod worker;

pub use batching::BatchingEmbeddingProvider;
pub use cached::CachedEmbeddingProvider;
pub use retry::RetryingEmbeddingProvider;
pub use traits::EmbeddingProvider;
pub use worker::WorkerEmbeddingProvider;
