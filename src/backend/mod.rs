//! External key-value store contract.
//!
//! The control plane talks to one shared store for two things: cache
//! entries with TTL, and sorted-set sliding windows for rate limiting.
//! [`SharedStore`] is the seam; implementations:
//!
//! - [`MemoryStore`]: in-process (moka + mutex-guarded windows). Used for
//!   single-node deployments and tests.
//! - [`RedisStore`]: redis-backed, behind the `redis` feature.
//!
//! Implementations report failures as [`HeimdallError::Store`](crate::HeimdallError::Store).
//! Absorbing those failures (fail-open, fail-closed-to-miss) is the
//! caller's job, not the store's.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Whether a sliding-window check records the current request when the
/// window is already full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRecord {
    /// Record unconditionally: rejected attempts also occupy a slot.
    Always,
    /// Record only when the request is admitted (`count < limit`).
    IfAdmitted,
}

/// Lookup counters kept by the store itself.
///
/// Unlike the per-process counters on [`CacheStore`](crate::cache::CacheStore),
/// these cover every client of a shared store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
}

/// External store operations the control plane relies on.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Store name for logging/debugging.
    fn name(&self) -> &str;

    /// Round-trip check used by `connect()` hooks.
    async fn ping(&self) -> Result<()>;

    /// Fetch a live (unexpired) value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// All live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Drop every entry in the store.
    async fn flush(&self) -> Result<()>;

    /// Store-side lookup counters, if the store keeps any.
    async fn stats(&self) -> Result<Option<StoreStats>> {
        Ok(None)
    }

    /// Atomic sliding-window step, as one unit:
    ///
    /// 1. remove entries with score `<= now - window`
    /// 2. count the remaining entries
    /// 3. insert an entry scored `now` (unconditionally, or only when the
    ///    count is below `limit`, per `record`)
    /// 4. refresh the key's expiry to `window`; an idle key disappears
    ///    once that expiry passes
    ///
    /// Returns the count from step 2. `now` is seconds since the UNIX epoch.
    async fn slide_window(
        &self,
        key: &str,
        now: f64,
        window: Duration,
        limit: u32,
        record: WindowRecord,
    ) -> Result<u64>;
}
