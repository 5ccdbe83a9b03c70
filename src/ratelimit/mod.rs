//! Sliding-window rate limiting.
//!
//! Two interchangeable [`RateLimiter`] implementations:
//!
//! - [`LocalRateLimiter`]: per-process map of recent request instants
//!   behind a single mutex.
//! - [`SharedRateLimiter`]: sorted-set windows in a [`SharedStore`](crate::backend::SharedStore),
//!   one atomic round trip per check. Fails open when the store is
//!   unreachable.
//!
//! # Rejected attempts
//!
//! The shared algorithm inserts the current instant whether or not the
//! request is admitted, so a rejected request still occupies a slot and
//! tightens the effective limit for the rest of the window. Both
//! implementations expose this as `record_rejected_attempts(bool)`:
//! on by default for [`SharedRateLimiter`], off by default for
//! [`LocalRateLimiter`].

mod local;
mod shared;

pub use local::LocalRateLimiter;
pub use shared::SharedRateLimiter;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::EndpointClass;
use crate::{HeimdallError, Result};

/// Sliding-window request counter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Limiter name for logging/debugging.
    fn name(&self) -> &str;

    /// Whether one more request for `key` fits in the trailing `window`.
    ///
    /// On `true` the current instant is recorded against `key`. Never
    /// fails: implementations backed by an external store fail open.
    async fn allow(&self, key: &str, limit: u32, window: Duration) -> bool;

    /// Lifecycle hook, called once at process start.
    async fn connect(&self) {}

    /// Lifecycle hook, called once at process stop.
    async fn disconnect(&self) {}
}

/// Limit for one endpoint class: at most `limit` requests per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u32,
    #[serde(rename = "window")]
    pub window_secs: u64,
}

impl RateLimit {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn validate(&self, class: &str) -> Result<()> {
        if self.limit == 0 || self.window_secs == 0 {
            return Err(HeimdallError::Configuration(format!(
                "rate limit for '{class}' must have limit > 0 and window > 0 (got {}/{}s)",
                self.limit, self.window_secs
            )));
        }
        Ok(())
    }
}

/// Immutable endpoint class → limit table, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    pub query: RateLimit,
    pub ingest: RateLimit,
    pub health: RateLimit,
    pub default: RateLimit,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            query: RateLimit::new(10, 60),
            ingest: RateLimit::new(5, 300),
            health: RateLimit::new(60, 60),
            default: RateLimit::new(100, 60),
        }
    }
}

impl RateLimitPolicy {
    /// Limit for an endpoint class.
    pub fn for_class(&self, class: EndpointClass) -> RateLimit {
        match class {
            EndpointClass::Query => self.query,
            EndpointClass::Ingest => self.ingest,
            EndpointClass::Health => self.health,
            EndpointClass::Default => self.default,
        }
    }

    /// Reject zero limits or windows.
    pub fn validate(&self) -> Result<()> {
        self.query.validate("query")?;
        self.ingest.validate("ingest")?;
        self.health.validate("health")?;
        self.default.validate("default")
    }
}
