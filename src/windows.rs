//! Date-window planning and truncation-defeating bisection.
//!
//! The upstream silently caps oversized responses at its per-request record
//! limit without any marker, so a full page is indistinguishable from a
//! truncated one. The splitter decomposes the extraction interval into
//! fixed-size windows and bisects any window whose fetch comes back at the
//! cap, recursing depth-first so records stay in chronological order.

use crate::extractor::config::{
    BISECT_FLOOR_DAYS, LOOKAHEAD_DAYS, SAFETY_OVERLAP_DAYS, WINDOW_DAYS,
};
use crate::extractor::job::ReplicationConfig;
use crate::fetcher::{PageFetch, RecordStream};
use crate::params::{ConfigError, ParamMap};
use crate::state::{Bound, PersistedState};
use crate::Partition;
use chrono::{Duration, NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Epoch date used as the lower bound for full-refresh streams.
fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date is valid")
}

/// A half-open date interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    from: NaiveDate,
    to: NaiveDate,
}

impl Window {
    /// Create a window; `from` must precede `to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ConfigError> {
        if from >= to {
            return Err(ConfigError::InvertedRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Inclusive lower bound.
    pub fn from(&self) -> NaiveDate {
        self.from
    }

    /// Exclusive upper bound.
    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Span in days (always at least 1).
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    /// Split at the temporal midpoint into earlier and later halves.
    ///
    /// Only valid for windows spanning at least two days; a one-day window
    /// cannot be split further.
    pub fn split(&self) -> Option<(Window, Window)> {
        if self.days() < 2 {
            return None;
        }
        let mid = self.from + Duration::days(self.days() / 2);
        Some((
            Window { from: self.from, to: mid },
            Window { from: mid, to: self.to },
        ))
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Time-slicing knobs for one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSliceConfig {
    /// Fixed window size in days
    pub window_days: i64,
    /// Upstream per-request record cap; a response at this count may have
    /// been silently truncated
    pub max_records_per_request: usize,
    /// Window span at or below which bisection stops
    pub bisect_floor_days: i64,
    /// Configured end date (exclusive); defaults to now plus lookahead
    pub end_date: Option<NaiveDate>,
    /// Query-parameter key for the window lower bound
    pub from_param: String,
    /// Query-parameter key for the window upper bound (sent inclusive)
    pub to_param: String,
}

impl TimeSliceConfig {
    /// Config for the given per-request record cap, defaults elsewhere.
    pub fn new(max_records_per_request: usize) -> Self {
        Self {
            window_days: WINDOW_DAYS,
            max_records_per_request,
            bisect_floor_days: BISECT_FLOOR_DAYS,
            end_date: None,
            from_param: "from".to_string(),
            to_param: "to".to_string(),
        }
    }

    /// Override the fixed window size.
    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days;
        self
    }

    /// Override the configured end date.
    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }
}

/// Resolve the lower bound of the extraction interval.
///
/// Full-refresh streams start at the epoch. Incremental streams start at
/// `max(high-water mark - safety overlap, configured floor)`; without a
/// persisted mark the configured floor alone decides. The one-day overlap
/// re-fetches the boundary so records landing near the mark are never
/// skipped.
pub fn resolve_lower_bound(
    partition: &Partition,
    state: &PersistedState,
    replication: Option<&ReplicationConfig>,
) -> NaiveDate {
    let Some(config) = replication else {
        return epoch();
    };

    let floor = config
        .floor_date(partition, state)
        .unwrap_or_else(epoch);

    let high_water = state
        .bookmark(partition)
        .and_then(|b| b.replication_value.as_ref())
        .and_then(Bound::from_value)
        .and_then(|bound| bound.as_date());

    match high_water {
        Some(mark) => {
            let resumed = mark - Duration::days(SAFETY_OVERLAP_DAYS);
            debug!(
                partition = %partition,
                %mark,
                %resumed,
                "Resuming from persisted high-water mark"
            );
            resumed.max(floor)
        }
        None => floor,
    }
}

/// Decomposes a date interval into windows and bisects saturated fetches.
pub struct TimeWindowSplitter {
    fetcher: Arc<dyn PageFetch>,
    config: TimeSliceConfig,
}

impl TimeWindowSplitter {
    /// Create a splitter over the given fetcher.
    pub fn new(fetcher: Arc<dyn PageFetch>, config: TimeSliceConfig) -> Self {
        Self { fetcher, config }
    }

    /// Compute the ordered window plan from `lower` up to the configured end
    /// date (or now plus lookahead).
    ///
    /// Windows are consecutive, non-overlapping and gap-free, each spanning
    /// `window_days` except the final one, which is clipped to the upper
    /// bound. An inverted interval is a configuration error raised before
    /// any network call; an empty interval yields an empty plan.
    pub fn build_windows(&self, lower: NaiveDate) -> Result<Vec<Window>, ConfigError> {
        let upper = self
            .config
            .end_date
            .unwrap_or_else(|| Utc::now().date_naive() + Duration::days(LOOKAHEAD_DAYS));

        if lower > upper {
            return Err(ConfigError::InvertedRange { from: lower, to: upper });
        }

        let mut windows = Vec::new();
        let mut cursor = lower;
        while cursor < upper {
            let end = (cursor + Duration::days(self.config.window_days)).min(upper);
            windows.push(Window { from: cursor, to: end });
            cursor = end;
        }

        debug!(
            windows = windows.len(),
            %lower,
            %upper,
            "Built window plan"
        );
        Ok(windows)
    }

    /// Lazily fetch one window, bisecting on suspected truncation.
    ///
    /// A response strictly below the per-request cap satisfies its window
    /// and its records are yielded as-is. A response at the cap may have
    /// been silently truncated: the window is split at its midpoint and the
    /// halves fetched depth-first, earlier first, keeping the overall
    /// sequence chronological. A window at the bisection floor that still
    /// comes back full is yielded with a possible-data-loss warning. A fetch
    /// error ends this window's stream after yielding the error.
    pub fn fetch_window(&self, url: String, params: ParamMap, window: Window) -> RecordStream {
        let fetcher = self.fetcher.clone();
        let config = self.config.clone();

        // Explicit depth-first work stack; recursion depth would be bounded
        // by log2(window_days) but async recursion boxes poorly.
        let stream = stream::unfold(vec![window], move |mut stack| {
            let fetcher = fetcher.clone();
            let config = config.clone();
            let url = url.clone();
            let params = params.clone();

            async move {
                let window = stack.pop()?;

                let mut params = params;
                params.insert(config.from_param.clone(), window.from().to_string());
                // Half-open window maps to the upstream's inclusive date pair
                let inclusive_to = window.to() - Duration::days(1);
                params.insert(config.to_param.clone(), inclusive_to.to_string());

                match fetcher.fetch_page(&url, &params, None).await {
                    Err(e) => {
                        stack.clear();
                        Some((stream::iter(vec![Err(e)]), stack))
                    }
                    Ok(page) => {
                        let count = page.records.len();
                        if count < config.max_records_per_request {
                            debug!(%window, records = count, "Window satisfied");
                            let items: Vec<_> = page.records.into_iter().map(Ok).collect();
                            Some((stream::iter(items), stack))
                        } else if window.days() <= config.bisect_floor_days {
                            warn!(
                                %window,
                                records = count,
                                cap = config.max_records_per_request,
                                "Window at bisection floor still returns a full page; upstream may have truncated records"
                            );
                            let items: Vec<_> = page.records.into_iter().map(Ok).collect();
                            Some((stream::iter(items), stack))
                        } else {
                            // Full page: assume truncation and split
                            let (earlier, later) = window
                                .split()
                                .expect("window wider than floor always splits");
                            debug!(%window, %earlier, %later, "Saturated window, bisecting");
                            stack.push(later);
                            stack.push(earlier);
                            Some((stream::iter(Vec::new()), stack))
                        }
                    }
                }
            }
        })
        .flatten();

        Box::pin(stream)
    }
}
