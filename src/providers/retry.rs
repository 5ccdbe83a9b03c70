//! Retrying embedding decorator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::traits::EmbeddingProvider;
use crate::resilience::{RetryConfig, retry_if, with_timeout};
use crate::types::Embedding;
use crate::{HeimdallError, Result};

/// Decorator that wraps an [`EmbeddingProvider`] with retry logic.
///
/// Transient errors (as classified by [`HeimdallError::is_transient`])
/// are retried with backoff; anything else is returned immediately. An
/// optional per-attempt timeout turns a hung call into a transient
/// [`HeimdallError::Timeout`] that is retried like any other.
pub struct RetryingEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    config: RetryConfig,
    attempt_timeout: Option<Duration>,
}

impl RetryingEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            attempt_timeout: None,
        }
    }

    /// Bound each individual attempt.
    pub fn attempt_timeout(mut self, after: Duration) -> Self {
        self.attempt_timeout = Some(after);
        self
    }

    async fn attempt<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.attempt_timeout {
            Some(after) => with_timeout(after, operation, fut).await,
            None => fut.await,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingEmbeddingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        retry_if(&self.config, "embed", HeimdallError::is_transient, || {
            self.attempt("embed", self.inner.embed(text, model))
        })
        .await
    }

    async fn embed_batch(&self, texts: &[&str], model: &str) -> Result<Vec<Embedding>> {
        retry_if(&self.config, "embed_batch", HeimdallError::is_transient, || {
            self.attempt("embed_batch", self.inner.embed_batch(texts, model))
        })
        .await
    }
}
