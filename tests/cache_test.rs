use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use heimdall::{
    CacheConfig, CacheKind, CacheStore, Connectivity, Embedding, HeimdallError, MemoryStore,
    QueryAnswer, Result, ResultCache, RetrievedChunk, SharedStore, WindowRecord,
};

// ============================================================================
// Mock store
// ============================================================================

/// Memory store that can be switched into failing mode mid-test.
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            down: AtomicBool::new(false),
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(HeimdallError::Store("connection reset".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SharedStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.check()?;
        self.inner.delete(keys).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.check()?;
        self.inner.scan_prefix(prefix).await
    }

    async fn flush(&self) -> Result<()> {
        self.check()?;
        self.inner.flush().await
    }

    async fn slide_window(
        &self,
        key: &str,
        now: f64,
        window: Duration,
        limit: u32,
        record: WindowRecord,
    ) -> Result<u64> {
        self.check()?;
        self.inner.slide_window(key, now, window, limit, record).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn connected_cache(config: CacheConfig) -> (Arc<FlakyStore>, ResultCache) {
    let backend = Arc::new(FlakyStore::new());
    let store = CacheStore::new(backend.clone()).allow_clear(config.allow_clear);
    assert!(store.connect().await);
    (backend, ResultCache::new(Arc::new(store), config))
}

fn embedding(v: f32) -> Embedding {
    Embedding::new(vec![v, v + 1.0], "test-model")
}

// ============================================================================
// CacheStore
// ============================================================================

#[tokio::test]
async fn store_starts_disconnected_and_misses() {
    let store = CacheStore::new(Arc::new(MemoryStore::new()));
    assert!(!store.is_connected());
    assert_eq!(store.get(CacheKind::Query, "query:all:abc").await, None);
    assert!(store.set("query:all:abc", b"x".to_vec(), Duration::from_secs(60)).await.is_err());

    let stats = store.stats();
    assert_eq!(stats.status, Connectivity::Disconnected);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn store_connect_fails_when_unreachable() {
    let backend = Arc::new(FlakyStore::new());
    backend.set_down(true);
    let store = CacheStore::new(backend);
    assert!(!store.connect().await);
    assert_eq!(store.stats().status, Connectivity::Disconnected);
}

#[tokio::test]
async fn store_errors_degrade_to_miss_and_noop() {
    let backend = Arc::new(FlakyStore::new());
    let store = CacheStore::new(backend.clone());
    assert!(store.connect().await);

    store
        .set("embedding:1", b"v".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(store.get(CacheKind::Embedding, "embedding:1").await, Some(b"v".to_vec()));

    backend.set_down(true);
    assert_eq!(store.get(CacheKind::Embedding, "embedding:1").await, None);
    let write = store
        .set("embedding:2", b"w".to_vec(), Duration::from_secs(60))
        .await;
    assert!(write.unwrap_err().reason.contains("connection reset"));

    backend.set_down(false);
    assert_eq!(store.get(CacheKind::Embedding, "embedding:2").await, None);
}

#[tokio::test]
async fn stats_report_hit_rate() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;
    assert_eq!(cache.stats().hit_rate, "0.0%");

    cache
        .set_query("q", Some("d"), 4, &QueryAnswer::new("a"), None)
        .await
        .unwrap();
    for _ in 0..3 {
        assert!(cache.get_query("q", Some("d"), 4).await.is_some());
    }
    assert!(cache.get_query("other", Some("d"), 4).await.is_none());

    let stats = cache.stats();
    assert_eq!(stats.status, Connectivity::Connected);
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate, "75.0%");

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["status"], "connected");
    assert_eq!(json["hit_rate"], "75.0%");
}

#[tokio::test]
async fn store_stats_cover_every_process_sharing_the_store() {
    let shared = Arc::new(MemoryStore::new());
    let ours = CacheStore::new(shared.clone());
    let theirs = CacheStore::new(shared.clone());
    assert!(ours.connect().await);
    assert!(theirs.connect().await);

    theirs
        .set("query:1", b"x".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();
    assert!(theirs.get(CacheKind::Query, "query:1").await.is_some());
    assert!(theirs.get(CacheKind::Query, "query:2").await.is_none());

    // Nothing went through this handle, but the store saw both lookups.
    assert_eq!(ours.stats().hits + ours.stats().misses, 0);
    let stats = ours.store_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate, "50.0%");
}

#[tokio::test]
async fn store_stats_fall_back_to_local_counters() {
    let (backend, cache) = connected_cache(CacheConfig::default()).await;
    assert!(cache.get_query("q", None, 4).await.is_none());

    // The flaky store keeps no counters of its own.
    assert_eq!(cache.store().store_stats().await, cache.stats());

    backend.set_down(true);
    cache.store().disconnect().await;
    let stats = cache.store().store_stats().await;
    assert_eq!(stats.status, Connectivity::Disconnected);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn clear_all_requires_permission() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;
    let err = cache.store().clear_all().await.unwrap_err();
    assert!(matches!(err, HeimdallError::Configuration(_)));

    let (_backend, cache) = connected_cache(CacheConfig::new().allow_clear(true)).await;
    cache
        .set_embedding("t", "m", &embedding(1.0), None)
        .await
        .unwrap();
    cache.store().clear_all().await.unwrap();
    assert!(cache.get_embedding("t", "m").await.is_none());
}

#[tokio::test]
async fn disconnect_turns_cache_off() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;
    cache
        .set_embedding("t", "m", &embedding(1.0), None)
        .await
        .unwrap();
    cache.store().disconnect().await;
    assert!(cache.get_embedding("t", "m").await.is_none());
    assert!(cache.set_embedding("t", "m", &embedding(1.0), None).await.is_err());
}

// ============================================================================
// ResultCache
// ============================================================================

#[tokio::test]
async fn typed_values_survive_the_store() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;

    let answer = QueryAnswer::new("Rust is a language").with_context("chapter 1");
    cache
        .set_query("what is rust?", Some("book"), 4, &answer, None)
        .await
        .unwrap();
    assert_eq!(cache.get_query("what is rust?", Some("book"), 4).await, Some(answer));

    let chunks = vec![
        RetrievedChunk::new("first").with_metadata("page", 1),
        RetrievedChunk::new("second").with_metadata("page", 7),
    ];
    cache
        .set_similarity("what is rust?", None, 2, &chunks, None)
        .await
        .unwrap();
    assert_eq!(cache.get_similarity("what is rust?", None, 2).await, Some(chunks));
}

#[tokio::test]
async fn different_arguments_do_not_collide() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;
    cache
        .set_query("q", Some("a"), 4, &QueryAnswer::new("for a"), None)
        .await
        .unwrap();
    assert!(cache.get_query("q", Some("b"), 4).await.is_none());
    assert!(cache.get_query("q", None, 4).await.is_none());
    assert!(cache.get_query("q", Some("a"), 3).await.is_none());
    // same arguments, different kind
    assert!(cache.get_similarity("q", Some("a"), 4).await.is_none());
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;
    cache
        .set_embedding("t", "m", &embedding(1.0), Some(Duration::from_millis(150)))
        .await
        .unwrap();
    assert!(cache.get_embedding("t", "m").await.is_some());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(cache.get_embedding("t", "m").await.is_none());
}

#[tokio::test]
async fn disabled_cache_never_hits() {
    let (_backend, cache) = connected_cache(CacheConfig::new().enabled(false)).await;
    assert!(
        cache
            .set_embedding("t", "m", &embedding(1.0), None)
            .await
            .is_err()
    );
    assert!(cache.get_embedding("t", "m").await.is_none());
}

#[tokio::test]
async fn undecodable_entry_is_a_miss() {
    let (backend, cache) = connected_cache(CacheConfig::default()).await;
    let key = ResultCache::key_for(
        CacheKind::Embedding,
        &heimdall::KeyArgs::new().arg("t").named("model_name", "m"),
    );
    backend
        .set(&key, b"not json".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();
    assert!(cache.get_embedding("t", "m").await.is_none());
}

#[tokio::test]
async fn invalidation_is_scoped_to_the_document() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;
    let answer = QueryAnswer::new("a");
    let chunks = vec![RetrievedChunk::new("c")];

    cache.set_query("q1", Some("doc-a"), 4, &answer, None).await.unwrap();
    cache.set_query("q2", Some("doc-a"), 4, &answer, None).await.unwrap();
    cache.set_similarity("q1", Some("doc-a"), 4, &chunks, None).await.unwrap();
    cache.set_query("q1", Some("doc-b"), 4, &answer, None).await.unwrap();
    cache.set_query("q1", None, 4, &answer, None).await.unwrap();
    cache.set_embedding("q1", "m", &embedding(1.0), None).await.unwrap();

    assert_eq!(cache.invalidate_for_document("doc-a").await, 3);

    assert!(cache.get_query("q1", Some("doc-a"), 4).await.is_none());
    assert!(cache.get_query("q2", Some("doc-a"), 4).await.is_none());
    assert!(cache.get_similarity("q1", Some("doc-a"), 4).await.is_none());

    assert!(cache.get_query("q1", Some("doc-b"), 4).await.is_some());
    assert!(cache.get_query("q1", None, 4).await.is_some());
    assert!(cache.get_embedding("q1", "m").await.is_some());
}

#[tokio::test]
async fn invalidation_does_not_reach_ids_sharing_a_prefix() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;
    let answer = QueryAnswer::new("a");
    cache.set_query("q", Some("a"), 4, &answer, None).await.unwrap();
    cache.set_query("q", Some("a:b"), 4, &answer, None).await.unwrap();
    cache.set_query("q", Some("a%3Ab"), 4, &answer, None).await.unwrap();

    assert_eq!(cache.invalidate_for_document("a").await, 1);
    assert!(cache.get_query("q", Some("a:b"), 4).await.is_some());
    assert!(cache.get_query("q", Some("a%3Ab"), 4).await.is_some());

    assert_eq!(cache.invalidate_for_document("a:b").await, 1);
    assert!(cache.get_query("q", Some("a%3Ab"), 4).await.is_some());
}

#[tokio::test]
async fn invalidation_is_idempotent() {
    let (_backend, cache) = connected_cache(CacheConfig::default()).await;
    cache
        .set_query("q", Some("doc-a"), 4, &QueryAnswer::new("a"), None)
        .await
        .unwrap();
    assert_eq!(cache.invalidate_for_document("doc-a").await, 1);
    assert_eq!(cache.invalidate_for_document("doc-a").await, 0);
    assert_eq!(cache.invalidate_for_document("never-cached").await, 0);
}

#[tokio::test]
async fn invalidation_with_store_down_is_a_noop() {
    let (backend, cache) = connected_cache(CacheConfig::default()).await;
    cache
        .set_query("q", Some("doc-a"), 4, &QueryAnswer::new("a"), None)
        .await
        .unwrap();

    backend.set_down(true);
    assert_eq!(cache.invalidate_for_document("doc-a").await, 0);

    backend.set_down(false);
    assert!(cache.get_query("q", Some("doc-a"), 4).await.is_some());
}
