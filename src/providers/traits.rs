//! Provider traits.

use async_trait::async_trait;

use crate::Result;
use crate::types::Embedding;

/// Provider for text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Generate embedding for a single text.
    async fn embed(&self, text: &str, model: &str) -> Result<Embedding>;

    /// Generate embeddings for multiple texts, one per input in input order.
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[&str], model: &str) -> Result<Vec<Embedding>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, model).await?);
        }
        Ok(results)
    }
}
