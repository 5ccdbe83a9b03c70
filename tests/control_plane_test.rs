use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use heimdall::config::Config;
use heimdall::{
    ControlPlane, Embedding, EmbeddingProvider, Heimdall, HeimdallError, LocalRateLimiter,
    MemoryStore, QueryAnswer, RateLimiter, RequestContext, Result, RetrievedChunk, RetryConfig,
};
use tokio::sync::oneshot;

fn quick_retry() -> RetryConfig {
    RetryConfig::new()
        .max_retries(2)
        .initial_delay(Duration::from_millis(10))
}

async fn plane_with(config: Config) -> ControlPlane {
    let plane = Heimdall::builder()
        .config(config)
        .retry(quick_retry())
        .build()
        .unwrap();
    plane.connect().await;
    plane
}

fn query_ctx(client: &str) -> RequestContext {
    RequestContext::new("/query", client)
}

#[tokio::test]
async fn default_plane_uses_local_limiter_and_memory_store() {
    let plane = plane_with(Config::default()).await;
    assert_eq!(plane.rate_limiter().name(), "local");
    assert_eq!(plane.cache_stats().status, heimdall::Connectivity::Connected);
}

#[tokio::test]
async fn injected_store_selects_shared_limiter() {
    let plane = Heimdall::builder()
        .store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap();
    assert_eq!(plane.rate_limiter().name(), "shared");
}

#[cfg(not(feature = "redis"))]
#[test]
fn store_url_without_redis_support_is_rejected() {
    let mut config = Config::default();
    config.store.url = Some("redis://localhost:6379".into());
    let err = Heimdall::builder().config(config).build().err().unwrap();
    assert!(matches!(err, HeimdallError::Configuration(_)));
}

#[test]
fn invalid_config_is_rejected_at_build() {
    let mut config = Config::default();
    config.concurrency.query = 0;
    assert!(Heimdall::builder().config(config).build().is_err());
}

#[test]
fn unrepresentable_timeout_is_rejected_at_build() {
    let mut config = Config::default();
    config.timeouts.request_secs = 1e20;
    let err = Heimdall::builder().config(config).build().err().unwrap();
    assert!(matches!(err, HeimdallError::Configuration(_)));
}

#[tokio::test]
async fn guard_rate_limits_per_client() {
    let mut config = Config::default();
    config.rate_limits.policy.query.limit = 2;
    let plane = plane_with(config).await;

    for _ in 0..2 {
        plane
            .guard(&query_ctx("10.0.0.1"), || async { Ok(()) })
            .await
            .unwrap();
    }
    let err = plane
        .guard(&query_ctx("10.0.0.1"), || async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "rate_limit_exceeded");
    assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));

    // another client has its own window
    plane
        .guard(&query_ctx("10.0.0.2"), || async { Ok(()) })
        .await
        .unwrap();
}

#[tokio::test]
async fn disabled_rate_limiting_admits_everything() {
    let mut config = Config::default();
    config.rate_limits.enabled = false;
    config.rate_limits.policy.query.limit = 1;
    let plane = plane_with(config).await;

    for _ in 0..5 {
        plane
            .guard(&query_ctx("10.0.0.1"), || async { Ok(()) })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn rejected_handler_is_never_run() {
    let mut config = Config::default();
    config.rate_limits.policy.query.limit = 1;
    let plane = plane_with(config).await;
    let runs = &AtomicU32::new(0);

    for _ in 0..3 {
        let _ = plane
            .guard(&query_ctx("10.0.0.1"), || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn guard_rejects_over_concurrency_cap() {
    let mut config = Config::default();
    config.concurrency.query = 1;
    let plane = Arc::new(plane_with(config).await);
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let holder = {
        let plane = Arc::clone(&plane);
        tokio::spawn(async move {
            plane
                .guard(&query_ctx("10.0.0.1"), || async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok(())
                })
                .await
        })
    };
    started_rx.await.unwrap();

    let err = plane
        .guard(&query_ctx("10.0.0.2"), || async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "too_many_concurrent_requests");

    release_tx.send(()).unwrap();
    holder.await.unwrap().unwrap();
    assert_eq!(plane.admission().in_flight("/query"), 0);
}

#[tokio::test(start_paused = true)]
async fn guard_times_out_slow_handlers() {
    let mut config = Config::default();
    config.timeouts.query_secs = Some(1.0);
    let plane = plane_with(config).await;

    let err = plane
        .guard(&query_ctx("10.0.0.1"), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "request_timeout");
    assert_eq!(plane.admission().in_flight("/query"), 0);
}

#[tokio::test]
async fn custom_rate_limiter_is_used() {
    let limiter: Arc<dyn RateLimiter> = Arc::new(LocalRateLimiter::new());
    let plane = Heimdall::builder()
        .rate_limiter(limiter.clone())
        .build()
        .unwrap();
    plane.connect().await;
    plane
        .guard(&RequestContext::new("/health", "monitor"), || async { Ok(()) })
        .await
        .unwrap();
    // the health policy is 60 per minute
    for _ in 0..59 {
        assert!(
            limiter
                .allow("rate_limit:health:monitor", 60, Duration::from_secs(60))
                .await
        );
    }
    assert!(
        !limiter
            .allow("rate_limit:health:monitor", 60, Duration::from_secs(60))
            .await
    );
}

#[tokio::test]
async fn cached_query_computes_once() {
    let plane = plane_with(Config::default()).await;
    let computed = &AtomicU32::new(0);

    for _ in 0..3 {
        let answer = plane
            .cached_query("what is rust?", Some("book"), 4, || async move {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(QueryAnswer::new("a language"))
            })
            .await
            .unwrap();
        assert_eq!(answer.answer, "a language");
    }
    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert_eq!(plane.cache_stats().hits, 2);
}

#[tokio::test]
async fn cached_query_retries_transient_failures() {
    let plane = plane_with(Config::default()).await;
    let attempts = &AtomicU32::new(0);

    let answer = plane
        .cached_query("q", None, 4, || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(HeimdallError::Upstream {
                    provider: "llm".into(),
                    message: "overloaded".into(),
                })
            } else {
                Ok(QueryAnswer::new("eventually"))
            }
        })
        .await
        .unwrap();
    assert_eq!(answer.answer, "eventually");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_computation_is_not_cached() {
    let plane = plane_with(Config::default()).await;
    let attempts = &AtomicU32::new(0);

    let err = plane
        .cached_query("q", None, 4, || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<QueryAnswer, _>(HeimdallError::InvalidInput("empty".into()))
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(plane.cache().get_query("q", None, 4).await.is_none());
}

#[tokio::test]
async fn reingest_invalidates_document_answers() {
    let plane = plane_with(Config::default()).await;
    let version = &AtomicU32::new(1);
    let compute = || async move {
        Ok(vec![RetrievedChunk::new(format!(
            "v{}",
            version.load(Ordering::SeqCst)
        ))])
    };

    let first = plane
        .cached_similarity("q", Some("handbook"), 3, compute)
        .await
        .unwrap();
    assert_eq!(first[0].page_content, "v1");

    version.store(2, Ordering::SeqCst);
    let stale = plane
        .cached_similarity("q", Some("handbook"), 3, compute)
        .await
        .unwrap();
    assert_eq!(stale[0].page_content, "v1");

    assert_eq!(plane.invalidate_document("handbook").await, 1);
    let fresh = plane
        .cached_similarity("q", Some("handbook"), 3, compute)
        .await
        .unwrap();
    assert_eq!(fresh[0].page_content, "v2");
}

#[tokio::test]
async fn clear_cache_respects_config() {
    let plane = plane_with(Config::default()).await;
    assert!(plane.clear_cache().await.is_err());

    let mut config = Config::default();
    config.cache.allow_clear = true;
    let plane = plane_with(config).await;
    plane
        .cached_query("q", None, 4, || async { Ok(QueryAnswer::new("a")) })
        .await
        .unwrap();
    plane.clear_cache().await.unwrap();
    assert!(plane.cache().get_query("q", None, 4).await.is_none());
}

#[tokio::test]
async fn disconnected_plane_still_serves() {
    let plane = &plane_with(Config::default()).await;
    plane.disconnect().await;

    let computed = &AtomicU32::new(0);
    for _ in 0..2 {
        plane
            .guard(&query_ctx("10.0.0.1"), || async move {
                plane
                    .cached_query("q", None, 4, || async move {
                        computed.fetch_add(1, Ordering::SeqCst);
                        Ok(QueryAnswer::new("a"))
                    })
                    .await
            })
            .await
            .unwrap();
    }
    // no cache: computed every time
    assert_eq!(computed.load(Ordering::SeqCst), 2);
}

struct CountingProvider {
    calls: AtomicU32,
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Embedding::new(vec![text.len() as f32], model))
    }
}

#[tokio::test]
async fn embedding_provider_is_cached() {
    let plane = plane_with(Config::default()).await;
    let inner = Arc::new(CountingProvider {
        calls: AtomicU32::new(0),
    });
    let provider = plane.embedding_provider(inner.clone());

    provider.embed("hello", "m").await.unwrap();
    provider.embed_batch(&["hello", "world"], "m").await.unwrap();
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
}
