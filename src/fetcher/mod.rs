//! Retrying fetch, response normalization and pagination

use crate::params::ParamMap;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

pub mod http;
pub mod normalize;
pub mod pagination;
pub mod retry;
pub mod shared_resources;

/// A normalized record: field name to value, field order preserved.
///
/// Decoded from one JSON object or CSV row; nested structures are normalized
/// recursively. Keys are stable lower-snake-case.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Fetcher errors.
///
/// Every message and URL carried here has already passed through credential
/// redaction; constructors in [`http`] enforce that.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Non-retryable upstream response (4xx other than 429)
    #[error("HTTP {status} from {url}: {message}")]
    Http {
        /// Upstream HTTP status code
        status: u16,
        /// Redacted request URL
        url: String,
        /// Redacted upstream message excerpt
        message: String,
    },

    /// Retry budget exhausted on a retryable failure
    #[error("retries exhausted for {url} after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Redacted request URL
        url: String,
        /// Total attempts made, including the first
        attempts: usize,
        /// Upstream status of the final attempt, if it got that far
        status: Option<u16>,
        /// Redacted description of the final failure
        message: String,
    },

    /// Response body decode failure
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Lazy, single-pass, ordered stream of records for one partition-invocation
pub type RecordStream = Pin<Box<dyn Stream<Item = FetcherResult<Record>> + Send>>;

/// Shape of a decoded response body.
///
/// Pagination terminates gracefully on non-list shapes, so the decoded
/// records keep a note of what the body actually was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// JSON array
    List,
    /// Bare JSON object, promoted to a one-element list
    Object,
    /// CSV rows (bulk mode)
    Rows,
    /// Anything else (scalar, null); carries no records
    Other,
}

impl PayloadShape {
    /// True for shapes that represent a sequence of records.
    pub fn is_list_like(&self) -> bool {
        matches!(self, PayloadShape::List | PayloadShape::Rows)
    }
}

/// One decoded page of records plus the shape it was decoded from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Normalized records in upstream order
    pub records: Vec<Record>,
    /// Shape of the response body
    pub shape: PayloadShape,
}

impl FetchedPage {
    /// An empty list-shaped page (clean end-of-data).
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            shape: PayloadShape::List,
        }
    }
}

/// One logical fetch against the upstream.
///
/// [`http::RetryingFetcher`] is the production implementation; the pagination
/// driver and the window splitter depend only on this trait so tests can
/// script synthetic upstreams.
#[async_trait]
pub trait PageFetch: Send + Sync {
    /// Fetch `url` with `params`, optionally pinned to a page number.
    ///
    /// When `page` is given it is injected into the parameter set under the
    /// configured pagination key before sending.
    async fn fetch_page(
        &self,
        url: &str,
        params: &ParamMap,
        page: Option<u64>,
    ) -> FetcherResult<FetchedPage>;
}
