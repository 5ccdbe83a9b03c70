//! Read-through embedding cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::traits::EmbeddingProvider;
use crate::cache::ResultCache;
use crate::types::Embedding;
use crate::{HeimdallError, Result};

/// Decorator that serves embeddings from a [`ResultCache`] and only asks
/// the wrapped provider for what is missing.
///
/// A batch is split per text: hits are resolved from the cache, all
/// misses go to the provider in a single `embed_batch` call, and the
/// results are spliced back at their original positions. Provider
/// failures propagate; cache failures never do.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Arc<ResultCache>,
    ttl: Option<Duration>,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, cache: Arc<ResultCache>) -> Self {
        Self {
            inner,
            cache,
            ttl: None,
        }
    }

    /// Override the embedding TTL configured on the cache.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    async fn store(&self, text: &str, model: &str, embedding: &Embedding) {
        if let Err(e) = self
            .cache
            .set_embedding(text, model, embedding, self.ttl)
            .await
        {
            debug!(model, reason = %e.reason, "embedding not cached");
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        if let Some(hit) = self.cache.get_embedding(text, model).await {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text, model).await?;
        self.store(text, model, &embedding).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[&str], model: &str) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut cached = Vec::with_capacity(texts.len());
        for text in texts {
            cached.push(self.cache.get_embedding(text, model).await);
        }

        let misses: Vec<&str> = texts
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(text, _)| *text)
            .collect();

        if misses.is_empty() {
            return Ok(cached.into_iter().flatten().collect());
        }

        debug!(
            model,
            total = texts.len(),
            misses = misses.len(),
            "embedding batch partially cached"
        );
        let computed = self.inner.embed_batch(&misses, model).await?;
        if computed.len() != misses.len() {
            return Err(HeimdallError::Upstream {
                provider: self.inner.name().to_owned(),
                message: format!(
                    "returned {} embeddings for {} texts",
                    computed.len(),
                    misses.len()
                ),
            });
        }

        for (text, embedding) in misses.iter().zip(&computed) {
            self.store(text, model, embedding).await;
        }

        merge_batch_results(cached, computed)
    }
}

/// Reassemble a batch from cache hits and provider results for the misses.
///
/// `computed` must hold exactly one entry per `None` in `cached`, in order.
fn merge_batch_results(
    cached: Vec<Option<Embedding>>,
    computed: Vec<Embedding>,
) -> Result<Vec<Embedding>> {
    let mut computed = computed.into_iter();
    let merged: Option<Vec<Embedding>> = cached
        .into_iter()
        .map(|hit| hit.or_else(|| computed.next()))
        .collect();
    merged.ok_or_else(|| HeimdallError::Internal("embedding batch length mismatch".to_string()))
}
