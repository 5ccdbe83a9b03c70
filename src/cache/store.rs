//! Fail-closed cache store with connectivity lifecycle and counters.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::SharedStore;
use crate::error::CacheUnavailable;
use crate::telemetry;
use crate::types::CacheKind;
use crate::{HeimdallError, Result};

/// Outcome of a best-effort cache write.
///
/// `Err` means the value was not persisted; the caller still has its
/// result and carries on. Kept as a distinct type so a failed write can
/// never be `?`-propagated into a request failure.
pub type CacheWrite = std::result::Result<(), CacheUnavailable>;

/// Store connectivity as last observed by the lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Connected,
    Disconnected,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Connected => f.write_str("connected"),
            Connectivity::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Read-only snapshot for the cache observability endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub status: Connectivity,
    pub hits: u64,
    pub misses: u64,
    /// Percentage with one decimal, e.g. `"75.0%"`; `"0.0%"` before any lookup.
    pub hit_rate: String,
}

impl CacheStats {
    fn new(status: Connectivity, hits: u64, misses: u64) -> Self {
        Self {
            status,
            hits,
            misses,
            hit_rate: format_hit_rate(hits, misses),
        }
    }
}

fn format_hit_rate(hits: u64, misses: u64) -> String {
    let total = hits + misses;
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", hits as f64 / total as f64 * 100.0)
}

/// Get/set/delete with TTL against a [`SharedStore`], degrading to
/// "always miss" whenever the store is unreachable.
///
/// Starts disconnected; call [`connect`](Self::connect) once at startup.
pub struct CacheStore {
    backend: Arc<dyn SharedStore>,
    connected: AtomicBool,
    allow_clear: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn SharedStore>) -> Self {
        Self {
            backend,
            connected: AtomicBool::new(false),
            allow_clear: false,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Permit [`clear_all`](Self::clear_all).
    pub fn allow_clear(mut self, allowed: bool) -> Self {
        self.allow_clear = allowed;
        self
    }

    /// Ping the backend and record connectivity. Returns whether it is reachable.
    pub async fn connect(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => {
                self.connected.store(true, Ordering::Release);
                info!(store = self.backend.name(), "cache store connected");
                true
            }
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                warn!(
                    store = self.backend.name(),
                    error = %e,
                    "cache store unreachable, caching disabled"
                );
                false
            }
        }
    }

    pub async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!(store = self.backend.name(), "cache store disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn record_miss(&self, kind: CacheKind) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "kind" => kind.as_str()).increment(1);
    }

    /// Look up a live entry. Store errors are treated as a miss.
    pub async fn get(&self, kind: CacheKind, key: &str) -> Option<Vec<u8>> {
        if !self.is_connected() {
            self.record_miss(kind);
            return None;
        }
        match self.backend.get(key).await {
            Ok(Some(bytes)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => kind.as_str())
                    .increment(1);
                debug!(key, "cache hit");
                Some(bytes)
            }
            Ok(None) => {
                self.record_miss(kind);
                debug!(key, "cache miss");
                None
            }
            Err(e) => {
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "op" => "get").increment(1);
                warn!(key, error = %e, "cache lookup failed, treating as miss");
                self.record_miss(kind);
                None
            }
        }
    }

    /// Store an entry. A failure is reported, never raised.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheWrite {
        if !self.is_connected() {
            return Err(CacheUnavailable::new("store not connected"));
        }
        match self.backend.set(key, value, ttl).await {
            Ok(()) => {
                debug!(key, ttl_secs = ttl.as_secs(), "cached entry");
                Ok(())
            }
            Err(e) => {
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "op" => "set").increment(1);
                warn!(key, error = %e, "cache write failed, skipping");
                Err(CacheUnavailable::new(e.to_string()))
            }
        }
    }

    /// Delete every live key starting with `prefix`. Returns the number deleted.
    ///
    /// Scan and delete are separate round trips: an entry written in
    /// between survives until its TTL.
    pub async fn delete_prefix(&self, prefix: &str) -> std::result::Result<u64, CacheUnavailable> {
        if !self.is_connected() {
            return Err(CacheUnavailable::new("store not connected"));
        }
        let outcome = async {
            let keys = self.backend.scan_prefix(prefix).await?;
            if keys.is_empty() {
                return Ok(0);
            }
            self.backend.delete(&keys).await
        }
        .await;

        outcome.map_err(|e: HeimdallError| {
            metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "op" => "invalidate").increment(1);
            warn!(prefix, error = %e, "cache invalidation failed");
            CacheUnavailable::new(e.to_string())
        })
    }

    /// Drop every entry in the store.
    ///
    /// Destructive and refused unless enabled with [`allow_clear`](Self::allow_clear).
    pub async fn clear_all(&self) -> Result<()> {
        if !self.allow_clear {
            return Err(HeimdallError::Configuration(
                "clearing the cache is disabled (set cache.allow_clear)".to_string(),
            ));
        }
        if !self.is_connected() {
            return Err(HeimdallError::Store("cache store not connected".to_string()));
        }
        self.backend.flush().await?;
        warn!(store = self.backend.name(), "cache cleared");
        Ok(())
    }

    fn status(&self) -> Connectivity {
        if self.is_connected() {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        }
    }

    /// Snapshot of connectivity and this process's counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.status(),
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Snapshot using the backend's own lookup counters, which cover every
    /// process sharing the store. Falls back to [`stats`](Self::stats) when
    /// the store is down or keeps no counters.
    pub async fn store_stats(&self) -> CacheStats {
        if !self.is_connected() {
            return self.stats();
        }
        match self.backend.stats().await {
            Ok(Some(s)) => CacheStats::new(self.status(), s.hits, s.misses),
            Ok(None) => self.stats(),
            Err(e) => {
                debug!(store = self.backend.name(), error = %e, "store stats unavailable");
                self.stats()
            }
        }
    }
}
