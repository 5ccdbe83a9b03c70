use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::admission::AdmissionController;
use crate::cache::{CacheStats, ResultCache};
use crate::config::Config;
use crate::providers::{CachedEmbeddingProvider, EmbeddingProvider, RetryingEmbeddingProvider};
use crate::ratelimit::RateLimiter;
use crate::resilience::{RetryConfig, WorkerPool, retry_if, with_timeout};
use crate::telemetry;
use crate::types::{QueryAnswer, RequestContext, RetrievedChunk};
use crate::{HeimdallError, Result};

/// The assembled control plane.
///
/// [`guard`](Self::guard) runs a request handler behind admission, rate
/// limiting and the request deadline, in that order. The `cached_*`
/// helpers are for use inside handlers: they consult the result cache and
/// run the expensive computation (with retry and a per-attempt timeout)
/// only on a miss.
pub struct ControlPlane {
    config: Config,
    admission: AdmissionController,
    rate_limiter: Arc<dyn RateLimiter>,
    cache: Arc<ResultCache>,
    workers: WorkerPool,
    retry: RetryConfig,
    compute_timeout: Duration,
}

impl ControlPlane {
    pub(super) fn new(
        config: Config,
        admission: AdmissionController,
        rate_limiter: Arc<dyn RateLimiter>,
        cache: Arc<ResultCache>,
        workers: WorkerPool,
        retry: RetryConfig,
        compute_timeout: Duration,
    ) -> Self {
        Self {
            config,
            admission,
            rate_limiter,
            cache,
            workers,
            retry,
            compute_timeout,
        }
    }

    /// Connect the cache store and the rate limiter. Call once at startup.
    ///
    /// Never fails: an unreachable store leaves caching disabled and rate
    /// limiting failing open.
    pub async fn connect(&self) {
        let cache_up = self.cache.store().connect().await;
        self.rate_limiter.connect().await;
        info!(cache_connected = cache_up, "control plane started");
    }

    /// Release store connectivity. Call once at shutdown.
    pub async fn disconnect(&self) {
        self.rate_limiter.disconnect().await;
        self.cache.store().disconnect().await;
        info!("control plane stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn rate_limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.rate_limiter
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Check the request against its class's rate limit.
    pub async fn check_rate_limit(&self, ctx: &RequestContext) -> Result<()> {
        if !self.config.rate_limits.enabled {
            return Ok(());
        }
        let limit = self.config.rate_limits.policy.for_class(ctx.class);
        let key = ctx.subject_key();
        if self
            .rate_limiter
            .allow(&key, limit.limit, limit.window())
            .await
        {
            return Ok(());
        }
        metrics::counter!(telemetry::RATE_LIMITED_TOTAL, "class" => ctx.class.as_str())
            .increment(1);
        warn!(
            client = %ctx.client,
            route = %ctx.route,
            limit = limit.limit,
            window_secs = limit.window_secs,
            "rate limit exceeded"
        );
        Err(HeimdallError::RateLimitExceeded {
            class: ctx.class.as_str().to_owned(),
            limit: limit.limit,
            window: limit.window(),
        })
    }

    /// Run `handler` for one request.
    ///
    /// Rejections come back as [`HeimdallError::TooManyConcurrentRequests`],
    /// [`HeimdallError::RateLimitExceeded`] or [`HeimdallError::RequestTimeout`],
    /// distinguishable via [`HeimdallError::code`]. The admission lease is
    /// held until the handler finishes or is abandoned.
    pub async fn guard<F, Fut, T>(&self, ctx: &RequestContext, handler: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = async {
            let _lease = self.admission.admit(&ctx.route, ctx.class)?;
            self.check_rate_limit(ctx).await?;
            self.admission.with_deadline(ctx.class, handler()).await
        }
        .await;
        self.record(ctx, &result, started.elapsed());
        result
    }

    fn record<T>(&self, ctx: &RequestContext, result: &Result<T>, elapsed: Duration) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(HeimdallError::TooManyConcurrentRequests { .. }) => "rejected",
            Err(HeimdallError::RateLimitExceeded { .. }) => "rate_limited",
            Err(HeimdallError::RequestTimeout { .. }) => "timeout",
            Err(_) => "error",
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "class" => ctx.class.as_str(),
            "outcome" => outcome,
        )
        .increment(1);

        if matches!(outcome, "rejected" | "rate_limited") {
            return;
        }
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "class" => ctx.class.as_str())
            .record(elapsed.as_secs_f64());

        if elapsed > self.config.timeouts.slow_request_threshold() {
            warn!(
                route = %ctx.route,
                class = ctx.class.as_str(),
                elapsed_ms = elapsed.as_millis() as u64,
                outcome,
                "slow request"
            );
        }
    }

    /// Run a pipeline computation with retry on transient errors and a
    /// per-attempt timeout.
    pub async fn compute<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let after = self.compute_timeout;
        retry_if(&self.retry, operation, HeimdallError::is_transient, || {
            with_timeout(after, operation, f())
        })
        .await
    }

    /// Answer from the cache, or compute, cache and return it.
    pub async fn cached_query<F, Fut>(
        &self,
        question: &str,
        doc_id: Option<&str>,
        k: usize,
        compute: F,
    ) -> Result<QueryAnswer>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<QueryAnswer>>,
    {
        if let Some(hit) = self.cache.get_query(question, doc_id, k).await {
            return Ok(hit);
        }
        let answer = self.compute("query", compute).await?;
        if let Err(e) = self.cache.set_query(question, doc_id, k, &answer, None).await {
            debug!(reason = %e.reason, "query answer not cached");
        }
        Ok(answer)
    }

    /// Similarity results from the cache, or compute, cache and return them.
    pub async fn cached_similarity<F, Fut>(
        &self,
        question: &str,
        doc_id: Option<&str>,
        k: usize,
        compute: F,
    ) -> Result<Vec<RetrievedChunk>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<RetrievedChunk>>>,
    {
        if let Some(hit) = self.cache.get_similarity(question, doc_id, k).await {
            return Ok(hit);
        }
        let chunks = self.compute("similarity", compute).await?;
        if let Err(e) = self
            .cache
            .set_similarity(question, doc_id, k, &chunks, None)
            .await
        {
            debug!(reason = %e.reason, "similarity results not cached");
        }
        Ok(chunks)
    }

    /// Wrap `provider` so embeddings are cached, retried and bounded per
    /// attempt with this plane's policies.
    pub fn embedding_provider(&self, provider: Arc<dyn EmbeddingProvider>) -> CachedEmbeddingProvider {
        let retrying = RetryingEmbeddingProvider::new(provider, self.retry.clone())
            .attempt_timeout(self.compute_timeout);
        CachedEmbeddingProvider::new(Arc::new(retrying), Arc::clone(&self.cache))
    }

    /// Drop cached answers derived from `doc_id`. Call after re-ingesting it.
    pub async fn invalidate_document(&self, doc_id: &str) -> u64 {
        self.cache.invalidate_for_document(doc_id).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cache stats as counted by the shared store itself.
    pub async fn store_stats(&self) -> CacheStats {
        self.cache.store().store_stats().await
    }

    /// Empty the whole cache. Refused unless `cache.allow_clear` is set.
    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.store().clear_all().await
    }
}
