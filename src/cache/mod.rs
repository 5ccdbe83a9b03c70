//! Caching subsystem.
//!
//! Two layers over a [`SharedStore`](crate::backend::SharedStore):
//!
//! - [`CacheStore`]: raw get/set/delete with TTL. Owns the connection
//!   lifecycle and the hit/miss counters, and fails closed: while the
//!   store is unreachable every lookup is a miss and every write is a
//!   reported no-op.
//!
//! - [`ResultCache`]: typed façade for the three artifact kinds
//!   (embeddings, query answers, similarity results). Derives keys with
//!   [`KeyHasher`](crate::keys::KeyHasher), applies per-kind TTLs and
//!   owns invalidation by document.
//!
//! The cache is purely a performance optimisation; nothing in here can
//! fail a request.

pub mod result;
pub mod store;

pub use result::ResultCache;
pub use store::{CacheStats, CacheStore, CacheWrite, Connectivity};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::CacheKind;

/// Configuration for the result cache.
///
/// ```rust
/// # use heimdall::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .ttl(Duration::from_secs(600))
///     .embedding_ttl(Duration::from_secs(7 * 86_400));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether lookups and writes happen at all. Default: true.
    pub enabled: bool,
    /// Default TTL for `query` and `similarity` entries. Default: 1 hour.
    pub default_ttl_secs: u64,
    /// Default TTL for `embedding` entries. Default: 24 hours.
    pub embedding_ttl_secs: u64,
    /// Capacity of the in-process store when no external store is
    /// configured. Default: 10,000.
    pub max_entries: u64,
    /// Whether the destructive [`CacheStore::clear_all`] is permitted.
    /// Default: false.
    pub allow_clear: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 3600,
            embedding_ttl_secs: 86_400,
            max_entries: 10_000,
            allow_clear: false,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable caching.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the default TTL for query and similarity entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the default TTL for embedding entries.
    pub fn embedding_ttl(mut self, ttl: Duration) -> Self {
        self.embedding_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the in-process store capacity.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Permit [`CacheStore::clear_all`].
    pub fn allow_clear(mut self, allowed: bool) -> Self {
        self.allow_clear = allowed;
        self
    }

    /// Default TTL for a kind.
    pub fn ttl_for(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::Embedding => Duration::from_secs(self.embedding_ttl_secs),
            CacheKind::Query | CacheKind::Similarity => Duration::from_secs(self.default_ttl_secs),
        }
    }
}
