//! Heimdall - request admission and result-caching control plane
//!
//! Sits in front of an expensive retrieval-and-answering pipeline and
//! decides whether a request may run at all (concurrency admission, rate
//! limiting), bounds how long it may run (deadlines, retries with
//! timeouts) and avoids recomputing embeddings, answers and similarity
//! results, while degrading gracefully when the backing store fails.
//!
//! # Example
//!
//! ```rust,no_run
//! use heimdall::{Heimdall, QueryAnswer, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let plane = Heimdall::builder().build()?;
//!     plane.connect().await;
//!
//!     let ctx = RequestContext::new("/query", "203.0.113.7");
//!     let answer = plane
//!         .guard(&ctx, || async {
//!             plane
//!                 .cached_query("what is rust?", Some("doc-1"), 4, || async {
//!                     Ok(QueryAnswer::new("a systems language"))
//!                 })
//!                 .await
//!         })
//!         .await?;
//!
//!     println!("{}", answer.answer);
//!     plane.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Degradation
//!
//! - Cache store down: every lookup misses, every write is skipped.
//! - Shared rate-limit store down: every check allows (fail-open).
//! - Admission and deadline rejections always reach the caller, each with
//!   a distinct [`HeimdallError::code`].

pub mod admission;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod providers;
pub mod ratelimit;
pub mod resilience;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use admission::{AdmissionController, ConcurrencyConfig, Lease, TimeoutConfig};
pub use backend::{MemoryStore, SharedStore, StoreStats, WindowRecord};
#[cfg(feature = "redis")]
pub use backend::RedisStore;
pub use cache::{CacheConfig, CacheStats, CacheStore, CacheWrite, Connectivity, ResultCache};
pub use config::Config;
pub use error::{CacheUnavailable, HeimdallError, Result};
pub use gateway::{ControlPlane, Heimdall, HeimdallBuilder};
pub use keys::{KeyArg, KeyArgs, KeyHasher};
pub use providers::{
    BatchingEmbeddingProvider, CachedEmbeddingProvider, EmbeddingProvider,
    RetryingEmbeddingProvider, WorkerEmbeddingProvider,
};
pub use ratelimit::{LocalRateLimiter, RateLimit, RateLimitPolicy, RateLimiter, SharedRateLimiter};
pub use resilience::{
    BatchCoalescer, BatchConfig, ConnectionPool, FailurePolicy, ManageConnection, PoolConfig,
    RetryConfig, WorkerPool, gather_bounded, retry, retry_if, try_gather_bounded, with_timeout,
};
pub use types::{CacheKind, Embedding, EndpointClass, QueryAnswer, RequestContext, RetrievedChunk};
pub use version::{PKG_VERSION, version_string};
