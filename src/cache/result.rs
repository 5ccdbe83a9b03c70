//! Typed result cache over [`CacheStore`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{CacheConfig, CacheStats, CacheStore, CacheWrite};
use crate::error::CacheUnavailable;
use crate::keys::{KeyArgs, KeyHasher};
use crate::types::{CacheKind, Embedding, QueryAnswer, RetrievedChunk};

/// Named argument that scopes query and similarity entries to a document.
const DOC_ID: &str = "doc_id";

/// Scope segment for entries that span every document.
const UNSCOPED: &str = "all";

/// Typed cache for embeddings, query answers and similarity results.
///
/// Query and similarity keys embed the document they were computed
/// against (`query:doc={id}:{digest}`), which is what lets
/// [`invalidate_for_document`](Self::invalidate_for_document) find them
/// by prefix. Entries computed across all documents are scoped `all` and
/// only expire by TTL.
pub struct ResultCache {
    store: Arc<CacheStore>,
    config: CacheConfig,
}

impl ResultCache {
    pub fn new(store: Arc<CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Key for `kind` and `args`.
    pub fn key_for(kind: CacheKind, args: &KeyArgs) -> String {
        if !kind.document_scoped() {
            return KeyHasher::derive(kind.as_str(), args);
        }
        let scope = match args.get_named(DOC_ID) {
            Some(doc_id) if doc_id != "null" => doc_scope(doc_id),
            _ => UNSCOPED.to_string(),
        };
        KeyHasher::derive_scoped(kind.as_str(), &scope, args)
    }

    /// Look up and decode an entry. Undecodable entries count as a miss.
    pub async fn get<T: DeserializeOwned>(&self, kind: CacheKind, args: &KeyArgs) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let key = Self::key_for(kind, args);
        let bytes = self.store.get(kind, &key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Encode and store an entry. `ttl` of `None` (or zero) uses the kind's default.
    pub async fn set<T: Serialize>(
        &self,
        kind: CacheKind,
        args: &KeyArgs,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheWrite {
        if !self.config.enabled {
            return Err(CacheUnavailable::new("caching disabled"));
        }
        let key = Self::key_for(kind, args);
        let bytes = serde_json::to_vec(value).map_err(|e| CacheUnavailable::new(e.to_string()))?;
        let ttl = ttl
            .filter(|t| !t.is_zero())
            .unwrap_or_else(|| self.config.ttl_for(kind));
        self.store.set(&key, bytes, ttl).await
    }

    pub async fn get_embedding(&self, text: &str, model: &str) -> Option<Embedding> {
        self.get(CacheKind::Embedding, &embedding_args(text, model))
            .await
    }

    pub async fn set_embedding(
        &self,
        text: &str,
        model: &str,
        embedding: &Embedding,
        ttl: Option<Duration>,
    ) -> CacheWrite {
        self.set(CacheKind::Embedding, &embedding_args(text, model), embedding, ttl)
            .await
    }

    pub async fn get_query(
        &self,
        question: &str,
        doc_id: Option<&str>,
        k: usize,
    ) -> Option<QueryAnswer> {
        self.get(CacheKind::Query, &retrieval_args(question, doc_id, k))
            .await
    }

    pub async fn set_query(
        &self,
        question: &str,
        doc_id: Option<&str>,
        k: usize,
        answer: &QueryAnswer,
        ttl: Option<Duration>,
    ) -> CacheWrite {
        self.set(CacheKind::Query, &retrieval_args(question, doc_id, k), answer, ttl)
            .await
    }

    pub async fn get_similarity(
        &self,
        question: &str,
        doc_id: Option<&str>,
        k: usize,
    ) -> Option<Vec<RetrievedChunk>> {
        self.get(CacheKind::Similarity, &retrieval_args(question, doc_id, k))
            .await
    }

    pub async fn set_similarity(
        &self,
        question: &str,
        doc_id: Option<&str>,
        k: usize,
        chunks: &[RetrievedChunk],
        ttl: Option<Duration>,
    ) -> CacheWrite {
        self.set(
            CacheKind::Similarity,
            &retrieval_args(question, doc_id, k),
            &chunks,
            ttl,
        )
        .await
    }

    /// Remove every query and similarity entry scoped to `doc_id`.
    ///
    /// Best effort: returns the number of entries removed, and 0 if the
    /// store could not be reached. Embeddings are content-addressed and
    /// left alone.
    pub async fn invalidate_for_document(&self, doc_id: &str) -> u64 {
        let scope = doc_scope(doc_id);
        let mut removed = 0;
        for kind in [CacheKind::Query, CacheKind::Similarity] {
            let prefix = KeyHasher::scope_prefix(kind.as_str(), &scope);
            match self.store.delete_prefix(&prefix).await {
                Ok(n) => removed += n,
                Err(e) => debug!(doc_id, kind = kind.as_str(), reason = %e.reason, "invalidation skipped"),
            }
        }
        if removed > 0 {
            debug!(doc_id, removed, "invalidated cached results for document");
        }
        removed
    }
}

/// Key segment for a document. `:` separates key segments, so it is
/// percent-escaped (along with `%` itself) to keep one id's prefix from
/// matching another's keys.
fn doc_scope(doc_id: &str) -> String {
    let mut scope = String::with_capacity(doc_id.len() + 4);
    scope.push_str("doc=");
    for c in doc_id.chars() {
        match c {
            '%' => scope.push_str("%25"),
            ':' => scope.push_str("%3A"),
            c => scope.push(c),
        }
    }
    scope
}

fn embedding_args(text: &str, model: &str) -> KeyArgs {
    KeyArgs::new().arg(text).named("model_name", model)
}

fn retrieval_args(question: &str, doc_id: Option<&str>, k: usize) -> KeyArgs {
    KeyArgs::new()
        .arg(question)
        .named(DOC_ID, doc_id)
        .named("k", k)
}
