//! Blocking embedding functions on the worker pool.

use std::sync::Arc;

use async_trait::async_trait;

use super::traits::EmbeddingProvider;
use crate::Result;
use crate::resilience::WorkerPool;
use crate::types::Embedding;

type EmbedFn = dyn Fn(&str, &str) -> Result<Vec<f32>> + Send + Sync;

/// Adapts a synchronous, CPU-bound embedding function (`text, model ->
/// vector`) into an [`EmbeddingProvider`] that runs on a [`WorkerPool`]
/// instead of the request-handling tasks.
///
/// A batch occupies a single worker slot for all of its texts.
pub struct WorkerEmbeddingProvider {
    name: String,
    pool: WorkerPool,
    embed_fn: Arc<EmbedFn>,
}

impl WorkerEmbeddingProvider {
    pub fn new<F>(name: impl Into<String>, pool: WorkerPool, embed_fn: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Vec<f32>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            pool,
            embed_fn: Arc::new(embed_fn),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for WorkerEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        let embed_fn = Arc::clone(&self.embed_fn);
        let text = text.to_owned();
        let model_name = model.to_owned();
        let values = self
            .pool
            .try_run(move || embed_fn(&text, &model_name))
            .await?;
        Ok(Embedding::new(values, model))
    }

    async fn embed_batch(&self, texts: &[&str], model: &str) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embed_fn = Arc::clone(&self.embed_fn);
        let texts: Vec<String> = texts.iter().map(|t| (*t).to_owned()).collect();
        let model_name = model.to_owned();
        let vectors = self
            .pool
            .try_run(move || {
                texts
                    .iter()
                    .map(|text| embed_fn(text, &model_name))
                    .collect::<Result<Vec<_>>>()
            })
            .await?;
        Ok(vectors
            .into_iter()
            .map(|values| Embedding::new(values, model))
            .collect())
    }
}
