//! Builder for control-plane instances

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::ControlPlane;
use crate::admission::AdmissionController;
use crate::backend::{MemoryStore, SharedStore};
use crate::cache::{CacheStore, ResultCache};
use crate::config::Config;
use crate::ratelimit::{LocalRateLimiter, RateLimiter, SharedRateLimiter};
use crate::resilience::{RetryConfig, WorkerPool};
use crate::Result;

/// Default bound on one attempt of a pipeline computation.
const DEFAULT_COMPUTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Main entry point for creating control planes.
pub struct Heimdall;

impl Heimdall {
    /// Create a new builder for configuring the control plane.
    pub fn builder() -> HeimdallBuilder {
        HeimdallBuilder::new()
    }
}

/// Builder for configuring control planes.
///
/// Without an explicit store, `store.url` selects a redis store (feature
/// `redis`) and its absence the in-process [`MemoryStore`]. The rate
/// limiter follows the store: shared over an external store, local
/// otherwise.
pub struct HeimdallBuilder {
    config: Config,
    store: Option<Arc<dyn SharedStore>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    retry: RetryConfig,
    compute_timeout: Duration,
}

impl HeimdallBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            store: None,
            rate_limiter: None,
            retry: RetryConfig::default(),
            compute_timeout: DEFAULT_COMPUTE_TIMEOUT,
        }
    }

    /// Use a loaded configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use this store for the cache (and the shared rate limiter).
    pub fn store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this rate limiter instead of the one derived from the store.
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Retry policy for pipeline computations.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bound on each attempt of a pipeline computation (default: 10s).
    pub fn compute_timeout(mut self, after: Duration) -> Self {
        self.compute_timeout = after;
        self
    }

    /// Build the control plane. Nothing is connected yet; call
    /// [`ControlPlane::connect`] at startup.
    pub fn build(self) -> Result<ControlPlane> {
        let config = self.config;
        config.validate()?;

        let (store, external) = match self.store {
            Some(store) => (store, true),
            None => match config.store.url.as_deref() {
                Some(url) => (open_store(url)?, true),
                None => {
                    let store: Arc<dyn SharedStore> =
                        Arc::new(MemoryStore::with_max_entries(config.cache.max_entries));
                    (store, false)
                }
            },
        };

        let record_rejected = config.rate_limits.record_rejected_attempts;
        let rate_limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None if external => {
                let mut limiter = SharedRateLimiter::new(Arc::clone(&store));
                if let Some(enabled) = record_rejected {
                    limiter = limiter.record_rejected_attempts(enabled);
                }
                Arc::new(limiter) as Arc<dyn RateLimiter>
            }
            None => {
                let mut limiter = LocalRateLimiter::new();
                if let Some(enabled) = record_rejected {
                    limiter = limiter.record_rejected_attempts(enabled);
                }
                Arc::new(limiter) as Arc<dyn RateLimiter>
            }
        };

        let cache_store =
            Arc::new(CacheStore::new(Arc::clone(&store)).allow_clear(config.cache.allow_clear));
        let cache = Arc::new(ResultCache::new(cache_store, config.cache.clone()));
        let admission = AdmissionController::new(config.concurrency.clone(), config.timeouts.clone());
        let workers = WorkerPool::new(config.workers.threads);

        info!(
            store = store.name(),
            rate_limiter = rate_limiter.name(),
            rate_limiting = config.rate_limits.enabled,
            caching = config.cache.enabled,
            "control plane built"
        );

        Ok(ControlPlane::new(
            config,
            admission,
            rate_limiter,
            cache,
            workers,
            self.retry,
            self.compute_timeout,
        ))
    }
}

impl Default for HeimdallBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "redis")]
fn open_store(url: &str) -> Result<Arc<dyn SharedStore>> {
    Ok(Arc::new(crate::backend::RedisStore::open(url)?))
}

#[cfg(not(feature = "redis"))]
fn open_store(_url: &str) -> Result<Arc<dyn SharedStore>> {
    Err(crate::HeimdallError::Configuration(
        "store.url requires the `redis` feature".to_string(),
    ))
}
