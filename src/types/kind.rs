//! Cache artifact kinds

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three artifact kinds the result cache stores.
///
/// Each kind has its own key namespace (the kind name is the key prefix)
/// and its own default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Embedding,
    Query,
    Similarity,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Embedding => "embedding",
            CacheKind::Query => "query",
            CacheKind::Similarity => "similarity",
        }
    }

    /// Kinds whose entries are derived from document content and must be
    /// dropped when a document is re-ingested.
    pub fn document_scoped(&self) -> bool {
        matches!(self, CacheKind::Query | CacheKind::Similarity)
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
