//! Telemetry metric name constants.
//!
//! Centralised metric names for flowmeta operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `flowmeta_`. Monotonic totals end in
//! `_total`, gauges carry their unit (`_entries`).
//!
//! # Common labels
//!
//! - `exporter`: exporter address, IPv4 shown unmapped (e.g. "192.0.2.1")

/// Lookups answered from the cache.
pub const CACHE_HITS_TOTAL: &str = "flowmeta_cache_hits_total";

/// Lookups not found in the cache.
pub const CACHE_MISSES_TOTAL: &str = "flowmeta_cache_misses_total";

/// Cache entries removed because nobody looked them up for too long.
pub const CACHE_EXPIRED_ENTRIES_TOTAL: &str = "flowmeta_cache_expired_entries_total";

/// Current number of cache entries.
pub const CACHE_SIZE_ENTRIES: &str = "flowmeta_cache_size_entries";

/// Maintenance runs that looked for entries to refresh.
pub const CACHE_REFRESH_RUNS_TOTAL: &str = "flowmeta_cache_refresh_runs_total";

/// Entries queued again for refresh.
pub const CACHE_REFRESH_TOTAL: &str = "flowmeta_cache_refresh_total";

/// Interface indexes that were sent to a provider as part of a multi-index batch.
pub const PROVIDER_BATCHED_COUNT: &str = "flowmeta_provider_batched_count";

/// Requests dropped because the dispatcher queue was full.
///
/// Labels: `exporter`.
pub const PROVIDER_BUSY_COUNT: &str = "flowmeta_provider_busy_count";

/// Batches rejected by an open breaker.
///
/// Labels: `exporter`.
pub const PROVIDER_BREAKER_OPEN_COUNT: &str = "flowmeta_provider_breaker_open_count";

/// Batches handed to the provider.
pub const PROVIDER_REQUESTS_TOTAL: &str = "flowmeta_provider_requests_total";

/// Provider queries that failed or timed out.
pub const PROVIDER_ERRORS_TOTAL: &str = "flowmeta_provider_errors_total";
