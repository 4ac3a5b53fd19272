//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `target`: invocation target id (e.g. "primary-model")
//! - `status`: outcome: "ok" or "error"
//! - `operation`: cache operation: "get" or "put"
//! - `to`: circuit status after a transition

/// Total invocations dispatched to a target (after retries settle).
///
/// Labels: `target`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "mimir_requests_total";

/// Invocation duration in seconds, including retries and backoff.
///
/// Labels: `target`.
pub const REQUEST_DURATION_SECONDS: &str = "mimir_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `target`.
pub const RETRIES_TOTAL: &str = "mimir_retries_total";

/// Total calls redirected to the fallback target.
///
/// Labels: `target` (the primary), `fallback`.
pub const FALLBACKS_TOTAL: &str = "mimir_fallbacks_total";

/// Total circuit breaker state transitions.
///
/// Labels: `target`, `to` ("closed" | "open" | "half_open").
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "mimir_circuit_transitions_total";

/// Total attempts rejected because the circuit was open.
///
/// Labels: `target`.
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "mimir_circuit_rejections_total";

/// Total response cache hits.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Total response cache misses.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Total cache store failures (recovered locally).
///
/// Labels: `operation` ("get" | "put").
pub const CACHE_ERRORS_TOTAL: &str = "mimir_cache_errors_total";

/// Total callers served by another caller's in-flight computation.
pub const CACHE_COALESCED_TOTAL: &str = "mimir_cache_coalesced_total";
