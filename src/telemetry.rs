//! Telemetry metric name constants.
//!
//! Centralised metric names for heimdall operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `class`: endpoint class (e.g. "query", "ingest", "health", "default")
//! - `outcome`: "ok", "error", "timeout", "rate_limited", "rejected"
//! - `kind`: cache kind: "embedding", "query" or "similarity"
//! - `operation`: unit of work name passed to retry/timeout wrappers
//! - `batch`: name of a batch coalescer

/// Total requests that went through the control plane.
///
/// Labels: `class`, `outcome`.
pub const REQUESTS_TOTAL: &str = "heimdall_requests_total";

/// Handler duration in seconds (admitted requests only).
///
/// Labels: `class`.
pub const REQUEST_DURATION_SECONDS: &str = "heimdall_request_duration_seconds";

/// Requests currently holding a lease.
pub const IN_FLIGHT_REQUESTS: &str = "heimdall_in_flight_requests";

/// Requests rejected by the rate limiter.
///
/// Labels: `class`.
pub const RATE_LIMITED_TOTAL: &str = "heimdall_rate_limited_total";

/// Requests rejected by admission control.
///
/// Labels: `class`, `scope` ("route" | "global").
pub const CONCURRENCY_REJECTED_TOTAL: &str = "heimdall_concurrency_rejected_total";

/// Requests abandoned at the request-duration ceiling.
///
/// Labels: `class`.
pub const REQUEST_TIMEOUTS_TOTAL: &str = "heimdall_request_timeouts_total";

/// Shared rate-limit checks that failed open because the store was unreachable.
pub const RATE_LIMIT_FAIL_OPEN_TOTAL: &str = "heimdall_rate_limit_fail_open_total";

/// Total retry attempts (not counting the initial attempt).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "heimdall_retries_total";

/// Total cache hits.
///
/// Labels: `kind`.
pub const CACHE_HITS_TOTAL: &str = "heimdall_cache_hits_total";

/// Total cache misses, including lookups skipped because the store is down.
///
/// Labels: `kind`.
pub const CACHE_MISSES_TOTAL: &str = "heimdall_cache_misses_total";

/// Store errors absorbed by the cache.
///
/// Labels: `op` ("get" | "set" | "invalidate").
pub const CACHE_ERRORS_TOTAL: &str = "heimdall_cache_errors_total";

/// Items handed to one batched call.
///
/// Labels: `batch`.
pub const BATCH_SIZE: &str = "heimdall_batch_size";
