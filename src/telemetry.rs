//! Telemetry metric name constants.
//!
//! Centralised metric names for kvasir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `kvasir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `endpoint` — logical endpoint (e.g. "taste_entities", "llm_complete")
//! - `provider` — provider name ("taste" | "llm")
//! - `status` — outcome: "ok" or "error"
//! - `state` — breaker state after a transition
//! - `reason` — why a batch closed: "size" | "deadline"

/// Total requests dispatched through the scheduler.
///
/// Labels: `endpoint`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "kvasir_requests_total";

/// Producer call duration in seconds.
///
/// Labels: `endpoint`.
pub const REQUEST_DURATION_SECONDS: &str = "kvasir_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `endpoint`.
pub const RETRIES_TOTAL: &str = "kvasir_retries_total";

/// Total admissions deferred by the limiter (a wake-up was scheduled).
///
/// Labels: `endpoint`.
pub const RATE_DEFERRALS_TOTAL: &str = "kvasir_rate_deferrals_total";

/// Total cache hits.
///
/// Labels: `endpoint`.
pub const CACHE_HITS_TOTAL: &str = "kvasir_cache_hits_total";

/// Total cache misses.
///
/// Labels: `endpoint`.
pub const CACHE_MISSES_TOTAL: &str = "kvasir_cache_misses_total";

/// Total callers that attached to an already in-flight key instead of
/// running their own producer.
///
/// Labels: `endpoint`.
pub const FLIGHT_JOINS_TOTAL: &str = "kvasir_flight_joins_total";

/// Total batches closed.
///
/// Labels: `endpoint`, `reason` ("size" | "deadline").
pub const BATCHES_CLOSED_TOTAL: &str = "kvasir_batches_closed_total";

/// Circuit breaker state transitions.
///
/// Labels: `provider`, `state` ("closed" | "open" | "half_open").
pub const BREAKER_TRANSITIONS_TOTAL: &str = "kvasir_breaker_transitions_total";

/// Total health probes executed.
///
/// Labels: `endpoint`, `status` ("ok" | "error").
pub const HEALTH_PROBES_TOTAL: &str = "kvasir_health_probes_total";

/// Total personas generated by the orchestrator.
///
/// Labels: `status` ("ok" | "error").
pub const PERSONAS_TOTAL: &str = "kvasir_personas_total";
