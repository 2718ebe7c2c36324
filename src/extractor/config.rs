//! Extraction tuning constants

/// Maximum number of retries after the first attempt of one logical fetch.
/// 5 retries with exponential backoff rides out transient upstream trouble
/// without looping forever on persistent failures.
pub const MAX_RETRIES: usize = 5;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff delay in milliseconds.
/// Caps the exponential curve (retry 5 = 32s capped to 30s).
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Bound on total elapsed time across all attempts of one logical fetch,
/// in seconds. Reached only when every attempt burns its full backoff.
pub const MAX_RETRY_ELAPSED_SECS: u64 = 300;

/// Default minimum interval between outbound calls sharing one throttle,
/// in milliseconds.
pub const MIN_CALL_INTERVAL_MS: u64 = 10;

/// Upper bound of the extra uniform delay added after a throttled wait,
/// in milliseconds. Desynchronizes callers released on the same boundary.
pub const THROTTLE_JITTER_MS: u64 = 100;

/// Hard ceiling on page numbers fetched in one pagination run.
/// Hitting it is logged as possible data loss, not raised.
pub const PAGE_CEILING: u64 = 10_000;

/// Consecutive empty pages required to end pagination. The upstream emits
/// one spurious empty page on occasion before truly ending.
pub const EMPTY_PAGE_TOLERANCE: u32 = 2;

/// Default time-slice window size in days.
pub const WINDOW_DAYS: i64 = 90;

/// Window span at or below which bisection stops, in days. A still-saturated
/// window this small is logged as possible data loss instead of split again.
pub const BISECT_FLOOR_DAYS: i64 = 1;

/// Days past today used as the upper bound when no end date is configured.
pub const LOOKAHEAD_DAYS: i64 = 90;

/// Days subtracted from a persisted high-water mark when resuming, so records
/// landing near the mark are never skipped.
pub const SAFETY_OVERLAP_DAYS: i64 = 1;
