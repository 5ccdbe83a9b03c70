//! Process-local sliding-window limiter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::RateLimiter;

/// Minimum time between sweeps of idle keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Recent request instants for one key.
struct Window {
    stamps: Vec<Instant>,
    span: Duration,
}

impl Window {
    /// Every retained instant has slid out of the window.
    fn is_idle(&self, now: Instant) -> bool {
        self.stamps
            .last()
            .is_none_or(|last| now.duration_since(*last) >= self.span)
    }
}

struct State {
    windows: HashMap<String, Window>,
    last_sweep: Instant,
}

impl State {
    /// Drop keys nobody has been admitted for within their window.
    fn sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        self.windows.retain(|_, w| !w.is_idle(now));
        self.last_sweep = now;
    }
}

/// In-process sliding-window limiter.
///
/// Keeps the recent request instants per key behind one mutex. Expired
/// instants are pruned lazily on access; keys that went idle are dropped
/// by a sweep that runs at most once a minute.
pub struct LocalRateLimiter {
    state: Mutex<State>,
    record_rejected: bool,
}

impl LocalRateLimiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            record_rejected: false,
        }
    }

    /// Also record rejected attempts, matching the shared limiter's
    /// record-always behaviour.
    pub fn record_rejected_attempts(mut self, enabled: bool) -> Self {
        self.record_rejected = enabled;
        self
    }

    /// Number of instants currently retained for `key` (pruned or not).
    pub async fn tracked(&self, key: &str) -> usize {
        self.state
            .lock()
            .await
            .windows
            .get(key)
            .map_or(0, |w| w.stamps.len())
    }

    /// Number of keys currently held.
    pub async fn keys(&self) -> usize {
        self.state.lock().await.windows.len()
    }
}

impl Default for LocalRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    fn name(&self) -> &str {
        "local"
    }

    async fn allow(&self, key: &str, limit: u32, window: Duration) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.sweep(now);

        let entry = state
            .windows
            .entry(key.to_owned())
            .or_insert_with(|| Window {
                stamps: Vec::new(),
                span: window,
            });
        entry.span = window;
        entry.stamps.retain(|t| now.duration_since(*t) < window);

        if entry.stamps.len() >= limit as usize {
            if self.record_rejected {
                entry.stamps.push(now);
            } else if entry.stamps.is_empty() {
                state.windows.remove(key);
            }
            return false;
        }

        entry.stamps.push(now);
        true
    }
}
