//! The generic extraction engine.
//!
//! One [`Extractor`] serves one upstream target: it owns the throttle every
//! request funnels through and stamps out a configured fetcher per job.
//! Execution per partition is depth-first and sequential; only the throttle
//! is shared across partitions.

use super::job::ExtractionJob;
use super::throttle::Throttle;
use super::ExtractError;
use crate::fetcher::http::{ReqwestTransport, RetryingFetcher, Transport};
use crate::fetcher::pagination::PaginationDriver;
use crate::fetcher::retry::RetryPolicy;
use crate::fetcher::{PageFetch, RecordStream};
use crate::params::ParamMap;
use crate::redact::Redactor;
use crate::state::{resolve_start, Bound, PersistedState};
use crate::windows::{resolve_lower_bound, TimeWindowSplitter};
use crate::Partition;
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extraction engine for one upstream target.
pub struct Extractor {
    transport: Arc<dyn Transport>,
    throttle: Arc<Throttle>,
    policy: RetryPolicy,
    redactor: Redactor,
}

impl Extractor {
    /// Engine over the shared HTTP clients with a fresh throttle.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::shared()),
            throttle: Arc::new(Throttle::default()),
            policy: RetryPolicy::default(),
            redactor: Redactor::none(),
        }
    }

    /// Set the API credential to redact from every error and log line.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.redactor = Redactor::new(Some(credential.into()));
        self
    }

    /// Share a throttle with other engines targeting the same upstream.
    pub fn with_throttle(mut self, throttle: Arc<Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Swap the transport (scripted upstreams in tests).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// The throttle this engine funnels requests through.
    pub fn throttle(&self) -> Arc<Throttle> {
        self.throttle.clone()
    }

    fn fetcher_for(&self, job: &ExtractionJob) -> Arc<RetryingFetcher> {
        Arc::new(
            RetryingFetcher::new(self.transport.clone(), self.throttle.clone())
                .with_policy(self.policy.clone())
                .with_redactor(self.redactor.clone())
                .with_mode(job.output)
                .with_page_param(job.page_param.clone()),
        )
    }

    /// Run one extraction pass for a partition.
    ///
    /// Resolves the start bound from persisted state and configuration,
    /// plans windows if the job is time-sliced, and returns the lazy,
    /// single-pass, chronologically ordered record stream. Configuration
    /// problems fail the partition here, before any network call; window
    /// failures during consumption are logged and skipped.
    pub async fn extract(
        &self,
        job: &ExtractionJob,
        partition: &Partition,
        state: &PersistedState,
    ) -> Result<RecordStream, ExtractError> {
        let url = job.render_url(partition)?;
        let mut params = job.params.merged(partition)?;
        let fetcher = self.fetcher_for(job);

        let stream: RecordStream = if let Some(time_slice) = &job.time_slice {
            // Windowed: optionally paginate inside each window, then bisect
            // saturated windows.
            let page_fetch: Arc<dyn PageFetch> = match &job.pagination {
                Some(pagination) => Arc::new(PaginationDriver::new(
                    fetcher.clone(),
                    pagination.clone(),
                )),
                None => fetcher.clone(),
            };

            let lower = resolve_lower_bound(partition, state, job.replication.as_ref());
            let splitter = Arc::new(TimeWindowSplitter::new(page_fetch, time_slice.clone()));
            let windows = splitter.build_windows(lower)?;
            info!(
                partition = %partition,
                windows = windows.len(),
                %lower,
                "Starting windowed extraction"
            );

            Self::windowed_stream(splitter, windows, url, params)
        } else {
            // Non-windowed: the identical priority chain resolves the start,
            // as a date parameter or a page cursor.
            let resolved = job
                .replication
                .as_ref()
                .map(|replication| resolve_start(partition, state, replication));

            if let (Some(replication), Some(Bound::Date(date))) = (
                job.replication.as_ref(),
                resolved,
            ) {
                if let Some(start_param) = &replication.start_param {
                    params.insert(start_param.clone(), date.to_string());
                }
            }

            match &job.pagination {
                Some(pagination) => {
                    let mut pagination = pagination.clone();
                    if pagination.pinned_page.is_none() {
                        if let Some(Bound::Int(page)) = resolved {
                            if let Ok(page) = u64::try_from(page) {
                                debug!(partition = %partition, page, "Resuming pagination from bookmark");
                                pagination.start_page = pagination.start_page.max(page);
                            }
                        }
                    }
                    info!(partition = %partition, "Starting paginated extraction");
                    PaginationDriver::new(fetcher, pagination).paginate(url, params)
                }
                None => {
                    info!(partition = %partition, "Starting single-fetch extraction");
                    Self::single_fetch_stream(fetcher, url, params)
                }
            }
        };

        let post = job.post.clone();
        Ok(Box::pin(
            stream.map(move |item| item.map(|record| post.apply(record))),
        ))
    }

    /// Walk the window plan in order, isolating failures to their window.
    fn windowed_stream(
        splitter: Arc<TimeWindowSplitter>,
        windows: Vec<crate::windows::Window>,
        url: String,
        params: ParamMap,
    ) -> RecordStream {
        let stream = stream::unfold(
            (windows.into_iter(), splitter, url, params),
            move |(mut windows, splitter, url, params)| async move {
                let window = windows.next()?;
                let inner = splitter
                    .fetch_window(url.clone(), params.clone(), window)
                    .filter_map(move |item| async move {
                        match item {
                            Ok(record) => Some(Ok(record)),
                            Err(e) => {
                                // Window failures are isolated; siblings and
                                // the partition continue.
                                warn!(%window, error = %e, "Window failed, skipping rest of window");
                                None
                            }
                        }
                    });
                Some((inner, (windows, splitter, url, params)))
            },
        )
        .flatten();
        Box::pin(stream)
    }

    /// One request, records yielded as a stream.
    fn single_fetch_stream(
        fetcher: Arc<RetryingFetcher>,
        url: String,
        params: ParamMap,
    ) -> RecordStream {
        let stream = stream::once(async move {
            match fetcher.fetch_page(&url, &params, None).await {
                Ok(page) => {
                    debug!(records = page.records.len(), "Fetched");
                    stream::iter(page.records.into_iter().map(Ok).collect::<Vec<_>>())
                }
                Err(e) => stream::iter(vec![Err(e)]),
            }
        })
        .flatten();
        Box::pin(stream)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}
