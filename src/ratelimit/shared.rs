//! Store-backed sliding-window limiter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::RateLimiter;
use crate::backend::{SharedStore, WindowRecord};
use crate::telemetry;

/// Sliding-window limiter over a [`SharedStore`].
///
/// Each check is a single atomic [`slide_window`](SharedStore::slide_window)
/// call. If the store is unreachable (never connected, or the call fails)
/// the request is allowed and the degradation is logged: rate limiting
/// must never block the request pipeline.
pub struct SharedRateLimiter {
    store: Arc<dyn SharedStore>,
    connected: AtomicBool,
    record: WindowRecord,
}

impl SharedRateLimiter {
    /// Wrap a store. Checks fail open until [`connect`](RateLimiter::connect) succeeds.
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            connected: AtomicBool::new(false),
            record: WindowRecord::Always,
        }
    }

    /// Whether rejected attempts occupy a window slot (default: `true`).
    pub fn record_rejected_attempts(mut self, enabled: bool) -> Self {
        self.record = if enabled {
            WindowRecord::Always
        } else {
            WindowRecord::IfAdmitted
        };
        self
    }

    /// Whether the last lifecycle transition left the store reachable.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn fail_open(&self, key: &str) -> bool {
        metrics::counter!(telemetry::RATE_LIMIT_FAIL_OPEN_TOTAL).increment(1);
        debug!(key, store = self.store.name(), "rate limit store unavailable, allowing");
        true
    }
}

#[async_trait]
impl RateLimiter for SharedRateLimiter {
    fn name(&self) -> &str {
        "shared"
    }

    async fn allow(&self, key: &str, limit: u32, window: Duration) -> bool {
        if !self.is_connected() {
            return self.fail_open(key);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        match self
            .store
            .slide_window(key, now, window, limit, self.record)
            .await
        {
            Ok(count) => count < u64::from(limit),
            Err(e) => {
                warn!(key, store = self.store.name(), error = %e, "rate limit check failed");
                self.fail_open(key)
            }
        }
    }

    async fn connect(&self) {
        match self.store.ping().await {
            Ok(()) => {
                self.connected.store(true, Ordering::Release);
                info!(store = self.store.name(), "shared rate limiter connected");
            }
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                warn!(
                    store = self.store.name(),
                    error = %e,
                    "shared rate limiter store unreachable, failing open"
                );
            }
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        info!(store = self.store.name(), "shared rate limiter disconnected");
    }
}
