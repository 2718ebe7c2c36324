//! Extraction orchestration.
//!
//! The engine walks one partition at a time through a fixed lifecycle:
//! resolve the start bound, build the window plan, fetch each window
//! (bisecting on suspected truncation) or paginate, and lazily yield
//! normalized records in order.
//!
//! # Quick Start
//!
//! ```no_run
//! use market_data_extractor::extractor::engine::Extractor;
//! use market_data_extractor::extractor::job::ExtractionJob;
//! use market_data_extractor::state::PersistedState;
//! use market_data_extractor::Partition;
//! use futures_util::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = ExtractionJob::new("https://api.example.com", "/api/eod/{symbol}");
//! let partition = Partition::new().with("symbol", "AAPL.US");
//!
//! let extractor = Extractor::new().with_credential("token");
//! let mut records = extractor
//!     .extract(&job, &partition, &PersistedState::new())
//!     .await?;
//! while let Some(record) = records.next().await {
//!     let _record = record?;
//!     // hand off to the schema/output layer
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`engine`] - The generic extraction engine
//! - [`job`] - Data-driven stream descriptors
//! - [`throttle`] - Shared minimum-interval throttling
//! - [`config`] - Tuning constants
//!
//! # Failure Semantics
//!
//! Configuration and state errors fail the partition before any network
//! call. A failure inside one time window is logged and that window skipped;
//! sibling windows and the partition continue. Fetch failures outside
//! windowing surface as a single error item terminating the record stream.

pub mod config;
pub mod engine;
pub mod job;
pub mod throttle;

pub use engine::Extractor;
pub use job::ExtractionJob;
pub use throttle::Throttle;

use crate::params::ConfigError;
use crate::state::StateError;

/// Partition-level fatal errors.
///
/// Only bound resolution and configuration problems fail a partition
/// outright; window-level failures are absorbed by the engine.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Configuration error (conflicting parameters, inverted range,
    /// unresolved placeholder)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persisted state could not be read
    #[error("state error: {0}")]
    State(#[from] StateError),
}
