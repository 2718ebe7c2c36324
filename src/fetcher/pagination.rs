//! Numbered-page pagination with a tolerant termination heuristic.
//!
//! Pages are fetched in sequence and their records yielded immediately in
//! the order received, with no buffering across pages. The upstream
//! occasionally emits a single spurious empty page before truly ending, so a
//! lone empty page does not stop iteration; only a configurable run of
//! consecutive empty pages does. A hard page ceiling guards against an
//! upstream that never stops.

use super::{FetcherResult, PageFetch, Record, RecordStream};
use crate::extractor::config::{EMPTY_PAGE_TOLERANCE, PAGE_CEILING};
use crate::params::ParamMap;
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pagination knobs for one stream.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaginationConfig {
    /// Fetch exactly this page and stop (overrides everything else)
    pub pinned_page: Option<u64>,
    /// First page of the iteration (integer bookmarks resume here)
    pub start_page: u64,
    /// Hard ceiling on the page number; reaching it logs possible data loss
    pub page_ceiling: u64,
    /// Consecutive empty pages required to end the run
    pub empty_page_tolerance: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            pinned_page: None,
            start_page: 0,
            page_ceiling: PAGE_CEILING,
            empty_page_tolerance: EMPTY_PAGE_TOLERANCE,
        }
    }
}

/// Issues a sequence of numbered-page fetches until a termination condition.
pub struct PaginationDriver {
    fetcher: Arc<dyn PageFetch>,
    config: PaginationConfig,
}

enum PageStep {
    /// Yield this batch and keep iterating
    Yield(Vec<FetcherResult<Record>>),
    /// Yield this batch, then stop
    Final(Vec<FetcherResult<Record>>),
}

impl PaginationDriver {
    /// Create a driver over the given fetcher.
    pub fn new(fetcher: Arc<dyn PageFetch>, config: PaginationConfig) -> Self {
        Self { fetcher, config }
    }

    /// Lazily yield all records of `url`, page by page.
    ///
    /// With a pinned page configured, exactly that one page is fetched.
    /// Otherwise iteration starts at `start_page` and ends on: a non-list
    /// response (logged, no error), `empty_page_tolerance` consecutive empty
    /// pages, or the page ceiling (logged as possible data loss).
    pub fn paginate(&self, url: String, params: ParamMap) -> RecordStream {
        if let Some(page) = self.config.pinned_page {
            let fetcher = self.fetcher.clone();
            let stream = stream::once(async move {
                match fetcher.fetch_page(&url, &params, Some(page)).await {
                    Ok(fetched) => {
                        debug!(page, records = fetched.records.len(), "Fetched pinned page");
                        stream::iter(fetched.records.into_iter().map(Ok).collect::<Vec<_>>())
                    }
                    Err(e) => stream::iter(vec![Err(e)]),
                }
            })
            .flatten();
            return Box::pin(stream);
        }

        let fetcher = self.fetcher.clone();
        let config = self.config.clone();
        let start_page = config.start_page;

        // State: (next page, consecutive empty pages seen, done)
        let stream = stream::unfold(
            (start_page, 0u32, false),
            move |(page, empty_streak, done)| {
                let fetcher = fetcher.clone();
                let config = config.clone();
                let url = url.clone();
                let params = params.clone();

                async move {
                    if done {
                        return None;
                    }

                    if page >= config.page_ceiling {
                        warn!(
                            page,
                            ceiling = config.page_ceiling,
                            "Page ceiling reached, stopping pagination; data past this point is lost"
                        );
                        return None;
                    }

                    let step = match fetcher.fetch_page(&url, &params, Some(page)).await {
                        Err(e) => PageStep::Final(vec![Err(e)]),
                        Ok(fetched) => {
                            if !fetched.shape.is_list_like() {
                                warn!(
                                    page,
                                    shape = ?fetched.shape,
                                    "Non-list response, stopping pagination"
                                );
                                PageStep::Final(Vec::new())
                            } else if fetched.records.is_empty() {
                                debug!(page, empty_streak = empty_streak + 1, "Empty page");
                                if empty_streak + 1 >= config.empty_page_tolerance {
                                    debug!(
                                        pages = page - start_page + 1,
                                        "Pagination complete"
                                    );
                                    PageStep::Final(Vec::new())
                                } else {
                                    PageStep::Yield(Vec::new())
                                }
                            } else {
                                debug!(page, records = fetched.records.len(), "Fetched page");
                                PageStep::Yield(fetched.records.into_iter().map(Ok).collect())
                            }
                        }
                    };

                    match step {
                        PageStep::Yield(items) => {
                            let next_streak = if items.is_empty() { empty_streak + 1 } else { 0 };
                            Some((stream::iter(items), (page + 1, next_streak, false)))
                        }
                        PageStep::Final(items) => Some((stream::iter(items), (page, 0, true))),
                    }
                }
            },
        )
        .flatten();

        Box::pin(stream)
    }
}

/// A full pagination pass can itself stand in for one logical fetch, so the
/// window splitter composes over it transparently.
#[async_trait::async_trait]
impl PageFetch for PaginationDriver {
    async fn fetch_page(
        &self,
        url: &str,
        params: &ParamMap,
        page: Option<u64>,
    ) -> FetcherResult<super::FetchedPage> {
        if let Some(page) = page {
            return self.fetcher.fetch_page(url, params, Some(page)).await;
        }
        let mut stream = self.paginate(url.to_string(), params.clone());
        let mut records = Vec::new();
        while let Some(item) = stream.next().await {
            records.push(item?);
        }
        Ok(super::FetchedPage {
            records,
            shape: super::PayloadShape::List,
        })
    }
}
