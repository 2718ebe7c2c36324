//! # Market Data Extractor Library
//!
//! A generic extraction engine for rate-limited, paginated, occasionally
//! inconsistent financial REST APIs. Produces an ordered, resumable record
//! stream per logical partition (one ticker symbol, CIK, exchange, ...).
//!
//! ## Features
//!
//! - **Shared Throttling**: a minimum inter-call interval enforced across all
//!   callers that share a [`Throttle`] instance
//! - **Classified Retries**: exponential backoff with full jitter, bounded
//!   attempts and bounded total elapsed time, retrying only transient errors
//! - **Adaptive Pagination**: numbered-page iteration tolerant of one-off
//!   empty responses, with a hard page ceiling
//! - **Time-Window Splitting**: recursive bisection of date windows to defeat
//!   silent per-request record-count truncation by the upstream
//! - **Incremental Resume**: start bounds resolved from layered persisted
//!   state and configuration, so re-invocation resumes near the prior position
//!
//! ## Quick Start
//!
//! ```no_run
//! use market_data_extractor::{Extractor, Partition};
//! use market_data_extractor::extractor::job::ExtractionJob;
//! use market_data_extractor::state::PersistedState;
//! use futures_util::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = ExtractionJob::new("https://api.example.com", "/api/eod/{symbol}");
//! let partition = Partition::new().with("symbol", "AAPL.US");
//! let state = PersistedState::new();
//!
//! let extractor = Extractor::new().with_credential("token");
//! let mut records = extractor.extract(&job, &partition, &state).await?;
//! while let Some(record) = records.next().await {
//!     println!("{:?}", record?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`extractor`] - Extraction orchestration, throttling and job descriptors
//! - [`fetcher`] - Retrying HTTP fetch, response normalization and pagination
//! - [`windows`] - Date-window planning and truncation-defeating bisection
//! - [`state`] - Persisted replication state (read-only) and start-bound resolution
//! - [`params`] - Layered query-parameter merging and conflict detection
//! - [`redact`] - Credential redaction for errors and log lines
//!
//! ## Concurrency Model
//!
//! Extraction is depth-first and sequential within one partition: one
//! outbound call in flight at a time, records yielded lazily in order. The
//! only cross-partition shared mutable state is the [`Throttle`]; callers
//! running partitions concurrently against the same upstream must share one
//! instance so the minimum inter-call interval holds globally.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// Extraction orchestration
pub mod extractor;

/// Retrying fetch, normalization and pagination
pub mod fetcher;

/// Layered query-parameter handling
pub mod params;

/// Credential redaction
pub mod redact;

/// Persisted replication state and start-bound resolution
pub mod state;

/// Date-window planning and bisection
pub mod windows;

// Re-export commonly used types
pub use extractor::engine::Extractor;
pub use extractor::throttle::Throttle;
pub use fetcher::Record;

/// Immutable key identifying one unit of extraction work.
///
/// A partition is an ordered set of key/value pairs (symbol, CIK, date, or a
/// combination) created by the caller before each extraction pass. Values fill
/// URL path templates, override query parameters, and key the persisted
/// replication state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    values: Vec<(String, String)>,
}

impl Partition {
    /// Create an empty partition.
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Add a key/value pair, replacing any existing value for the key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.values.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.values.push((key, value));
        }
        self
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over the key/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if the partition carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Key under which this partition's replication state is stored.
    ///
    /// Values joined in insertion order, e.g. `AAPL.US` or `AAPL.US:2024-01-02`.
    pub fn state_key(&self) -> String {
        self.values
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.state_key())
    }
}
