//! Extraction job descriptors.
//!
//! One [`ExtractionJob`] is a data-driven description of one upstream
//! stream: where it lives, how its parameters assemble, how responses
//! decode, and whether pagination and time-slicing apply. A single generic
//! engine consumes these descriptors; endpoint differences live in data, not
//! in per-endpoint types.

use crate::fetcher::http::{OutputMode, DEFAULT_PAGE_PARAM};
use crate::fetcher::normalize::{self, SURROGATE_KEY_FIELD};
use crate::fetcher::pagination::PaginationConfig;
use crate::fetcher::Record;
use crate::params::{ConfigError, ParamLayers};
use crate::state::{Bound, PartitionBookmark, PersistedState};
use crate::windows::TimeSliceConfig;
use crate::Partition;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Incremental replication settings for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Record field acting as the replication key (high-water mark source)
    pub key: String,
    /// Stream-level configured starting bound
    pub stream_start: Option<Bound>,
    /// Tap-wide global start; the floor of last resort
    pub global_start: Bound,
    /// For non-windowed incremental streams: query-parameter key the
    /// resolved date start is injected under
    pub start_param: Option<String>,
}

impl ReplicationConfig {
    /// Incremental replication on `key` with the given global start.
    pub fn new(key: impl Into<String>, global_start: Bound) -> Self {
        Self {
            key: key.into(),
            stream_start: None,
            global_start,
            start_param: None,
        }
    }

    /// Override the stream-level starting bound.
    pub fn with_stream_start(mut self, start: Bound) -> Self {
        self.stream_start = Some(start);
        self
    }

    /// Inject the resolved date start under this parameter for non-windowed
    /// streams.
    pub fn with_start_param(mut self, param: impl Into<String>) -> Self {
        self.start_param = Some(param.into());
        self
    }

    /// The configured floor as a date: persisted starting-value override,
    /// then stream start, then global start; first date wins.
    pub fn floor_date(&self, partition: &Partition, state: &PersistedState) -> Option<NaiveDate> {
        let persisted_override = state
            .bookmark(partition)
            .and_then(|b: &PartitionBookmark| b.starting_value.as_ref())
            .and_then(Bound::from_value)
            .and_then(|b| b.as_date());

        persisted_override
            .or_else(|| self.stream_start.and_then(|b| b.as_date()))
            .or_else(|| self.global_start.as_date())
    }
}

/// Caller-supplied post-processing applied to each record as it is yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcess {
    /// Field renames applied after key normalization
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    /// Synthesize a surrogate key when the upstream has no natural one
    #[serde(default)]
    pub surrogate_key: bool,
}

impl PostProcess {
    /// Apply renames, then surrogate-key synthesis if enabled.
    ///
    /// The surrogate key hashes the record's own field values before it is
    /// injected, so the key never feeds itself.
    pub fn apply(&self, record: Record) -> Record {
        let mut record = normalize::apply_renames(record, &self.renames);
        if self.surrogate_key && !record.contains_key(SURROGATE_KEY_FIELD) {
            let key = normalize::surrogate_key(&record);
            record.insert(SURROGATE_KEY_FIELD.to_string(), Value::String(key));
        }
        record
    }
}

/// Data-driven description of one extraction stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionJob {
    /// Upstream base URL, e.g. `https://api.example.com`
    pub base_url: String,
    /// Path template with `{placeholder}` segments filled from the partition
    /// and parameter layers, e.g. `/api/eod/{symbol}`
    pub path: String,
    /// Configured parameter layers
    pub params: ParamLayers,
    /// How response bodies decode
    pub output: OutputMode,
    /// Pagination settings; `None` disables pagination
    pub pagination: Option<PaginationConfig>,
    /// Query-parameter key the page number is injected under
    pub page_param: String,
    /// Time-slicing settings; `None` disables windowing
    pub time_slice: Option<TimeSliceConfig>,
    /// Incremental replication settings; `None` means full refresh
    pub replication: Option<ReplicationConfig>,
    /// Post-processing hook
    pub post: PostProcess,
}

impl ExtractionJob {
    /// A JSON, non-paginated, full-refresh job for the given endpoint.
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            params: ParamLayers::default(),
            output: OutputMode::Json,
            pagination: None,
            page_param: DEFAULT_PAGE_PARAM.to_string(),
            time_slice: None,
            replication: None,
            post: PostProcess::default(),
        }
    }

    /// Set the parameter layers.
    pub fn with_params(mut self, params: ParamLayers) -> Self {
        self.params = params;
        self
    }

    /// Set the output mode.
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Enable pagination.
    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Override the pagination parameter key.
    pub fn with_page_param(mut self, page_param: impl Into<String>) -> Self {
        self.page_param = page_param.into();
        self
    }

    /// Enable time-slicing.
    pub fn with_time_slice(mut self, time_slice: TimeSliceConfig) -> Self {
        self.time_slice = Some(time_slice);
        self
    }

    /// Enable incremental replication.
    pub fn with_replication(mut self, replication: ReplicationConfig) -> Self {
        self.replication = Some(replication);
        self
    }

    /// Set the post-processing hook.
    pub fn with_post(mut self, post: PostProcess) -> Self {
        self.post = post;
        self
    }

    /// Render the request URL for a partition, filling every `{placeholder}`
    /// in the path template.
    ///
    /// Placeholder values come from the partition first, then the path
    /// layer, then the query/other layers. An unfillable placeholder is a
    /// configuration error raised before any network call.
    pub fn render_url(&self, partition: &Partition) -> Result<String, ConfigError> {
        let mut rendered = String::with_capacity(self.base_url.len() + self.path.len());
        rendered.push_str(&self.base_url);

        let mut rest = self.path.as_str();
        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return Err(ConfigError::UnresolvedPlaceholder {
                    placeholder: after.to_string(),
                });
            };
            let name = &after[..close];
            let value = self.params.placeholder_value(partition, name).ok_or_else(|| {
                ConfigError::UnresolvedPlaceholder {
                    placeholder: name.to_string(),
                }
            })?;
            rendered.push_str(value);
            rest = &after[close + 1..];
        }
        rendered.push_str(rest);
        Ok(rendered)
    }
}
