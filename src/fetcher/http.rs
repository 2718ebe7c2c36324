//! Retrying HTTP fetch with classification-aware backoff.
//!
//! [`RetryingFetcher`] performs one logical GET: throttle, send, classify,
//! retry transient failures with jittered exponential backoff, then decode
//! and normalize the body. Terminal failures surface as typed errors whose
//! URLs and messages have the API credential redacted.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::retry::{RetryErrorType, RetryPolicy};
use super::shared_resources::{global_bulk_http_client, global_http_client};
use super::{normalize, FetchedPage, FetcherError, FetcherResult, PageFetch, Record};
use crate::extractor::throttle::Throttle;
use crate::params::ParamMap;
use crate::redact::Redactor;

/// Default query-parameter key the page number is injected under.
pub const DEFAULT_PAGE_PARAM: &str = "page";

/// Longest upstream-body excerpt carried in error messages.
const BODY_EXCERPT_LEN: usize = 200;

/// Output mode of one stream: how response bodies decode into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum OutputMode {
    /// JSON body (array of objects, or a bare object)
    #[default]
    Json,
    /// Bulk mode: delimited text rows
    Csv,
}

/// Raw response from the transport layer, before decode.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body text
    pub body: String,
}

/// Transport-level failure (no HTTP status was obtained).
#[derive(Debug, Clone)]
pub struct TransportFailure {
    /// Unredacted failure description; redacted at the error boundary
    pub message: String,
    /// The request timed out
    pub timeout: bool,
    /// The connection could not be established
    pub connect: bool,
}

/// The wire beneath [`RetryingFetcher`].
///
/// Production uses [`ReqwestTransport`]; tests script status sequences to
/// exercise the retry loop without sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one GET of `url` with `params`, using the bulk timeout
    /// profile when `bulk` is set.
    async fn get(
        &self,
        url: &str,
        params: &ParamMap,
        bulk: bool,
    ) -> Result<RawResponse, TransportFailure>;
}

/// [`Transport`] over the shared `reqwest` clients.
pub struct ReqwestTransport {
    standard: Arc<reqwest::Client>,
    bulk: Arc<reqwest::Client>,
}

impl ReqwestTransport {
    /// Transport over the process-wide client pair.
    pub fn shared() -> Self {
        Self {
            standard: global_http_client(),
            bulk: global_bulk_http_client(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        params: &ParamMap,
        bulk: bool,
    ) -> Result<RawResponse, TransportFailure> {
        let client = if bulk { &self.bulk } else { &self.standard };
        let response = client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| TransportFailure {
                timeout: e.is_timeout(),
                connect: e.is_connect(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportFailure {
            timeout: e.is_timeout(),
            connect: false,
            message: e.to_string(),
        })?;

        Ok(RawResponse { status, body })
    }
}

/// Performs one logical HTTP GET with retry and response normalization.
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    throttle: Arc<Throttle>,
    policy: RetryPolicy,
    redactor: Redactor,
    mode: OutputMode,
    page_param: String,
}

impl RetryingFetcher {
    /// Create a fetcher over the given transport and throttle.
    pub fn new(transport: Arc<dyn Transport>, throttle: Arc<Throttle>) -> Self {
        Self {
            transport,
            throttle,
            policy: RetryPolicy::default(),
            redactor: Redactor::none(),
            mode: OutputMode::Json,
            page_param: DEFAULT_PAGE_PARAM.to_string(),
        }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the credential to redact from errors and log lines.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Set the response decode mode.
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the pagination parameter key.
    pub fn with_page_param(mut self, page_param: impl Into<String>) -> Self {
        self.page_param = page_param.into();
        self
    }

    /// Fetch and return only the records (shape discarded).
    pub async fn fetch(&self, url: &str, params: &ParamMap) -> FetcherResult<Vec<Record>> {
        Ok(self.fetch_page(url, params, None).await?.records)
    }

    fn decode(&self, body: &str) -> FetcherResult<FetchedPage> {
        let decoded = match self.mode {
            OutputMode::Json => normalize::decode_json(body),
            OutputMode::Csv => normalize::decode_csv(body),
        };
        decoded.map_err(|e| match e {
            FetcherError::Parse(message) => FetcherError::Parse(self.redactor.scrub(&message)),
            other => other,
        })
    }

    /// A 400 whose body is an empty JSON list is how some bulk endpoints
    /// signal clean end-of-data.
    fn is_empty_list_body(body: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(body)
            .map(|v| v.as_array().is_some_and(|a| a.is_empty()))
            .unwrap_or(false)
    }

    fn excerpt(body: &str) -> &str {
        let body = body.trim();
        if body.len() <= BODY_EXCERPT_LEN {
            return body;
        }
        let mut end = BODY_EXCERPT_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        &body[..end]
    }

    async fn request_with_retry(
        &self,
        url: &str,
        params: &ParamMap,
    ) -> FetcherResult<RawResponse> {
        let bulk = self.mode == OutputMode::Csv;
        let started = Instant::now();
        let mut attempt: usize = 0;

        loop {
            self.throttle.acquire().await;

            let failure: (RetryErrorType, Option<u16>, String) =
                match self.transport.get(url, params, bulk).await {
                    Ok(response) if (200..300).contains(&response.status) => {
                        debug!(
                            url = %self.redactor.scrub(url),
                            attempt = attempt + 1,
                            "Request succeeded"
                        );
                        return Ok(response);
                    }
                    Ok(response) if response.status == 400
                        && Self::is_empty_list_body(&response.body) =>
                    {
                        // Some bulk endpoints end their data this way.
                        debug!(
                            url = %self.redactor.scrub(url),
                            "HTTP 400 with empty list body, treating as end of data"
                        );
                        return Ok(RawResponse {
                            status: 200,
                            body: "[]".to_string(),
                        });
                    }
                    Ok(response) => {
                        let error_type = RetryErrorType::from_status(response.status);
                        if !error_type.is_retryable() {
                            return Err(FetcherError::Http {
                                status: response.status,
                                url: self.redactor.scrub(url),
                                message: self.redactor.scrub(Self::excerpt(&response.body)),
                            });
                        }
                        (
                            error_type,
                            Some(response.status),
                            Self::excerpt(&response.body).to_string(),
                        )
                    }
                    Err(transport_failure) => (
                        RetryErrorType::from_transport(
                            transport_failure.timeout,
                            transport_failure.connect,
                        ),
                        None,
                        transport_failure.message,
                    ),
                };

            let (error_type, status, message) = failure;
            if self.policy.should_retry(&error_type, attempt, started.elapsed()) {
                let backoff = self.policy.backoff(attempt);
                warn!(
                    url = %self.redactor.scrub(url),
                    attempt = attempt + 1,
                    max_attempts = self.policy.max_retries + 1,
                    error = error_type.description(),
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying after {}",
                    error_type.description()
                );
                sleep(backoff).await;
                attempt += 1;
                continue;
            }

            return Err(FetcherError::RetriesExhausted {
                url: self.redactor.scrub(url),
                attempts: attempt + 1,
                status,
                message: format!(
                    "{}: {}",
                    error_type.description(),
                    self.redactor.scrub(&message)
                ),
            });
        }
    }
}

#[async_trait]
impl PageFetch for RetryingFetcher {
    async fn fetch_page(
        &self,
        url: &str,
        params: &ParamMap,
        page: Option<u64>,
    ) -> FetcherResult<FetchedPage> {
        let response = match page {
            Some(page) => {
                let mut params = params.clone();
                params.insert(self.page_param.clone(), page.to_string());
                self.request_with_retry(url, &params).await?
            }
            None => self.request_with_retry(url, params).await?,
        };
        self.decode(&response.body)
    }
}
