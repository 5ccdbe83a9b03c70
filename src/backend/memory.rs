//! In-process [`SharedStore`] implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use tokio::sync::Mutex;

use super::{SharedStore, StoreStats, WindowRecord};
use crate::Result;

/// Default maximum number of entries held by a [`MemoryStore`].
const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// Minimum seconds between sweeps of expired window keys.
const WINDOW_SWEEP_SECS: f64 = 60.0;

#[derive(Clone)]
struct StoredValue {
    bytes: Arc<Vec<u8>>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// One sorted-set window: scores plus the key expiry refreshed on each step.
struct Window {
    scores: Vec<f64>,
    expires_at: f64,
}

#[derive(Default)]
struct Windows {
    keys: HashMap<String, Window>,
    last_sweep: f64,
}

impl Windows {
    /// Drop keys whose expiry has passed, at most once per sweep interval.
    fn sweep(&mut self, now: f64) {
        if now - self.last_sweep < WINDOW_SWEEP_SECS {
            return;
        }
        self.keys.retain(|_, w| w.expires_at > now);
        self.last_sweep = now;
    }
}

/// Thread-safe in-process store.
///
/// Cache entries live in a bounded moka cache with per-entry TTL. Sliding
/// windows live in a mutex-guarded map, so [`slide_window`](SharedStore::slide_window)
/// is atomic with respect to other callers in the same process. Window
/// keys expire `window` after their last step, like the redis keys do.
pub struct MemoryStore {
    entries: Cache<String, StoredValue>,
    windows: Mutex<Windows>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store with the default capacity (100,000 entries).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with a custom entry capacity.
    pub fn with_max_entries(max: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            entries,
            windows: Mutex::new(Windows::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Number of window keys currently held.
    pub async fn window_keys(&self) -> usize {
        self.windows.lock().await.keys.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.entries.get(key).await;
        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value.map(|v| v.bytes.as_ref().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries
            .insert(
                key.to_owned(),
                StoredValue {
                    bytes: Arc::new(value),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            if self.entries.remove(key).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        self.entries.invalidate_all();
        self.windows.lock().await.keys.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<Option<StoreStats>> {
        Ok(Some(StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }))
    }

    async fn slide_window(
        &self,
        key: &str,
        now: f64,
        window: Duration,
        limit: u32,
        record: WindowRecord,
    ) -> Result<u64> {
        let span = window.as_secs_f64();
        let cutoff = now - span;
        let mut windows = self.windows.lock().await;
        windows.sweep(now);

        let entry = windows.keys.entry(key.to_owned()).or_insert_with(|| Window {
            scores: Vec::new(),
            expires_at: now + span,
        });
        entry.scores.retain(|score| *score > cutoff);
        let count = entry.scores.len() as u64;

        if record == WindowRecord::Always || count < u64::from(limit) {
            entry.scores.push(now);
        }
        entry.expires_at = now + span;
        Ok(count)
    }
}
