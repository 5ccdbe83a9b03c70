//! Concurrency admission and request deadlines.
//!
//! Every request must hold a [`Lease`] while it runs: one permit from the
//! pool of its route (capacity chosen by endpoint class) and one from the
//! global pool. Admission never waits. If either pool is empty at the
//! moment of the check the request is rejected with
//! [`HeimdallError::TooManyConcurrentRequests`] and the client is expected
//! to retry; bounded queues would only move the latency into the tail.
//!
//! Permits are RAII: dropping the lease releases them on every exit path,
//! including handler panics and timeouts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::telemetry;
use crate::types::EndpointClass;
use crate::{HeimdallError, Result};

/// Per-route-class and global concurrency caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Cap across all routes. Default: 20.
    pub global: usize,
    /// Per-route cap for `/query*`. Default: 5.
    pub query: usize,
    /// Per-route cap for `/ingest*`. Default: 3.
    pub ingest: usize,
    /// Per-route cap for every other route. Default: 10.
    pub default: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            global: 20,
            query: 5,
            ingest: 3,
            default: 10,
        }
    }
}

impl ConcurrencyConfig {
    /// Per-route capacity for an endpoint class.
    pub fn capacity_for(&self, class: EndpointClass) -> usize {
        match class {
            EndpointClass::Query => self.query,
            EndpointClass::Ingest => self.ingest,
            EndpointClass::Health | EndpointClass::Default => self.default,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.global == 0 || self.query == 0 || self.ingest == 0 || self.default == 0 {
            return Err(HeimdallError::Configuration(
                "concurrency caps must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request-duration ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Ceiling applied to every request without a class override. Default: 30s.
    pub request_secs: f64,
    /// Override for query routes. Default: 25s.
    pub query_secs: Option<f64>,
    /// Override for ingest routes. Default: 60s.
    pub ingest_secs: Option<f64>,
    /// Completed requests slower than this are logged. Default: 1s.
    pub slow_request_secs: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30.0,
            query_secs: Some(25.0),
            ingest_secs: Some(60.0),
            slow_request_secs: 1.0,
        }
    }
}

impl TimeoutConfig {
    /// A single ceiling for every class.
    pub fn uniform(ceiling: Duration) -> Self {
        Self {
            request_secs: ceiling.as_secs_f64(),
            query_secs: None,
            ingest_secs: None,
            ..Self::default()
        }
    }

    pub fn ceiling_for(&self, class: EndpointClass) -> Duration {
        let secs = match class {
            EndpointClass::Query => self.query_secs.unwrap_or(self.request_secs),
            EndpointClass::Ingest => self.ingest_secs.unwrap_or(self.request_secs),
            EndpointClass::Health | EndpointClass::Default => self.request_secs,
        };
        Duration::from_secs_f64(secs)
    }

    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.slow_request_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let all = [
            Some(self.request_secs),
            self.query_secs,
            self.ingest_secs,
            Some(self.slow_request_secs),
        ];
        if all
            .into_iter()
            .flatten()
            .any(|s| s <= 0.0 || Duration::try_from_secs_f64(s).is_err())
        {
            return Err(HeimdallError::Configuration(
                "timeouts must be > 0 and representable as a duration".to_string(),
            ));
        }
        Ok(())
    }
}

/// A held admission: one in-flight request.
///
/// Released exactly once, when dropped.
#[derive(Debug)]
pub struct Lease {
    route: String,
    _route_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
}

impl Lease {
    pub fn route(&self) -> &str {
        &self.route
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        metrics::gauge!(telemetry::IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}

/// Permit pool for one route path; capacity fixed by the class seen first.
#[derive(Clone)]
struct RoutePool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Non-blocking per-route and global concurrency gate.
pub struct AdmissionController {
    config: ConcurrencyConfig,
    timeouts: TimeoutConfig,
    global: Arc<Semaphore>,
    routes: DashMap<String, RoutePool>,
}

impl AdmissionController {
    pub fn new(config: ConcurrencyConfig, timeouts: TimeoutConfig) -> Self {
        let global = Arc::new(Semaphore::new(config.global));
        Self {
            config,
            timeouts,
            global,
            routes: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ConcurrencyConfig {
        &self.config
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    fn route_pool(&self, route: &str, class: EndpointClass) -> RoutePool {
        if let Some(pool) = self.routes.get(route) {
            return pool.value().clone();
        }
        self.routes
            .entry(route.to_owned())
            .or_insert_with(|| {
                let capacity = self.config.capacity_for(class);
                RoutePool {
                    permits: Arc::new(Semaphore::new(capacity)),
                    capacity,
                }
            })
            .value()
            .clone()
    }

    /// Try to admit one request for `route`. Never waits.
    pub fn admit(&self, route: &str, class: EndpointClass) -> Result<Lease> {
        let pool = self.route_pool(route, class);
        let limit = pool.capacity;
        let route_permit = match pool.permits.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                metrics::counter!(telemetry::CONCURRENCY_REJECTED_TOTAL,
                    "class" => class.as_str(),
                    "scope" => "route",
                )
                .increment(1);
                warn!(route, limit, "too many concurrent requests");
                return Err(HeimdallError::TooManyConcurrentRequests {
                    route: route.to_owned(),
                    limit,
                });
            }
        };

        let global_permit = match self.global.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                metrics::counter!(telemetry::CONCURRENCY_REJECTED_TOTAL,
                    "class" => class.as_str(),
                    "scope" => "global",
                )
                .increment(1);
                warn!(route, limit = self.config.global, "global concurrency cap reached");
                return Err(HeimdallError::TooManyConcurrentRequests {
                    route: route.to_owned(),
                    limit: self.config.global,
                });
            }
        };

        metrics::gauge!(telemetry::IN_FLIGHT_REQUESTS).increment(1.0);
        Ok(Lease {
            route: route.to_owned(),
            _route_permit: route_permit,
            _global_permit: global_permit,
        })
    }

    /// Run `handler` under the class's request-duration ceiling.
    ///
    /// On expiry the handler future is dropped (its own call chain unwinds)
    /// and [`HeimdallError::RequestTimeout`] is returned. Work it already
    /// handed to other tasks keeps running; its result is discarded.
    pub async fn with_deadline<F, T>(&self, class: EndpointClass, handler: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let ceiling = self.timeouts.ceiling_for(class);
        match tokio::time::timeout(ceiling, handler).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!(telemetry::REQUEST_TIMEOUTS_TOTAL, "class" => class.as_str())
                    .increment(1);
                warn!(class = class.as_str(), ceiling_ms = ceiling.as_millis() as u64, "request timeout");
                Err(HeimdallError::RequestTimeout { after: ceiling })
            }
        }
    }

    /// Admit, then run `handler` under the deadline while holding the lease.
    pub async fn run<F, T>(&self, route: &str, class: EndpointClass, handler: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _lease = self.admit(route, class)?;
        self.with_deadline(class, handler).await
    }

    /// Requests currently holding a permit for `route`.
    pub fn in_flight(&self, route: &str) -> usize {
        self.routes.get(route).map_or(0, |pool| {
            pool.capacity
                .saturating_sub(pool.permits.available_permits())
        })
    }

    /// Requests currently holding a global permit.
    pub fn in_flight_total(&self) -> usize {
        self.config
            .global
            .saturating_sub(self.global.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacities_by_class() {
        let config = ConcurrencyConfig::default();
        assert_eq!(config.capacity_for(EndpointClass::Query), 5);
        assert_eq!(config.capacity_for(EndpointClass::Ingest), 3);
        assert_eq!(config.capacity_for(EndpointClass::Health), 10);
        assert_eq!(config.capacity_for(EndpointClass::Default), 10);
    }

    #[test]
    fn ceilings_by_class() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.ceiling_for(EndpointClass::Query), Duration::from_secs(25));
        assert_eq!(timeouts.ceiling_for(EndpointClass::Ingest), Duration::from_secs(60));
        assert_eq!(timeouts.ceiling_for(EndpointClass::Health), Duration::from_secs(30));

        let uniform = TimeoutConfig::uniform(Duration::from_secs(5));
        assert_eq!(uniform.ceiling_for(EndpointClass::Ingest), Duration::from_secs(5));
    }

    #[test]
    fn invalid_timeouts_rejected() {
        let timeouts = TimeoutConfig {
            query_secs: Some(0.0),
            ..TimeoutConfig::default()
        };
        assert!(timeouts.validate().is_err());
    }

    #[test]
    fn oversized_timeouts_rejected() {
        for secs in [1e20, f64::INFINITY, f64::NAN] {
            let timeouts = TimeoutConfig {
                request_secs: secs,
                ..TimeoutConfig::default()
            };
            assert!(timeouts.validate().is_err(), "{secs} accepted");
        }
    }
}
