//! Batching embedding decorator.

use std::sync::Arc;

use async_trait::async_trait;

use super::traits::EmbeddingProvider;
use crate::resilience::{BatchCoalescer, BatchConfig};
use crate::types::Embedding;
use crate::{HeimdallError, Result};

/// Decorator that turns concurrent single-text `embed` calls into
/// `embed_batch` calls on the inner provider.
///
/// Texts are grouped per model within a batch. A failed batch fails every
/// text in it with [`HeimdallError::Upstream`]. `embed_batch` calls are
/// already batched and go straight through.
pub struct BatchingEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    coalescer: BatchCoalescer<(String, String), Embedding>,
}

impl BatchingEmbeddingProvider {
    /// Must be called inside a tokio runtime.
    pub fn new(inner: Arc<dyn EmbeddingProvider>, config: BatchConfig) -> Self {
        let batch_inner = Arc::clone(&inner);
        let coalescer = BatchCoalescer::spawn(
            inner.name().to_owned(),
            config,
            move |items: Vec<(String, String)>| embed_grouped(Arc::clone(&batch_inner), items),
        );
        Self { inner, coalescer }
    }
}

/// One `embed_batch` call per distinct model, results put back in
/// submission order.
async fn embed_grouped(
    inner: Arc<dyn EmbeddingProvider>,
    items: Vec<(String, String)>,
) -> Result<Vec<Embedding>> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, (_, model)) in items.iter().enumerate() {
        match groups.iter_mut().find(|(m, _)| m == model) {
            Some((_, positions)) => positions.push(i),
            None => groups.push((model.clone(), vec![i])),
        }
    }

    let mut slots: Vec<Option<Embedding>> = Vec::with_capacity(items.len());
    slots.resize_with(items.len(), || None);

    for (model, positions) in &groups {
        let mut texts = Vec::with_capacity(positions.len());
        for &i in positions {
            texts.push(items[i].0.as_str());
        }
        let embeddings = inner.embed_batch(&texts, model).await?;
        if embeddings.len() != positions.len() {
            return Err(HeimdallError::Upstream {
                provider: inner.name().to_owned(),
                message: format!(
                    "returned {} embeddings for {} texts",
                    embeddings.len(),
                    positions.len()
                ),
            });
        }
        for (&i, embedding) in positions.iter().zip(embeddings) {
            slots[i] = Some(embedding);
        }
    }

    let mut out = Vec::with_capacity(slots.len());
    for slot in slots {
        out.push(slot.ok_or_else(|| HeimdallError::Internal("batch slot left empty".into()))?);
    }
    Ok(out)
}

#[async_trait]
impl EmbeddingProvider for BatchingEmbeddingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        self.coalescer
            .submit((text.to_owned(), model.to_owned()))
            .await
    }

    async fn embed_batch(&self, texts: &[&str], model: &str) -> Result<Vec<Embedding>> {
        self.inner.embed_batch(texts, model).await
    }
}
