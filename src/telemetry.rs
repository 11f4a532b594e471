//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model`: model name as reported by [`LanguageModel::name()`](crate::LanguageModel::name)
//! - `operation`: "generate" or "stream"
//! - `status`: "ok" or "error"
//! - `direction`: "prompt" or "completion"

/// Total top-level calls observed by the logging layer.
///
/// Labels: `model`, `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "muninn_requests_total";

/// Call duration in seconds, measured by the logging layer.
///
/// For streams this covers establishment only.
///
/// Labels: `model`, `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "muninn_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "muninn_retries_total";

/// Total tokens reported in usage.
///
/// Labels: `model`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "muninn_tokens_total";

/// Total cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Calls forwarded uncached because no key could be derived.
///
/// Labels: `operation`.
pub const CACHE_BYPASS_TOTAL: &str = "muninn_cache_bypass_total";
