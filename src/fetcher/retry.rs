//! Retry classification and backoff policy.
//!
//! Transient transport and server failures are retried with capped
//! exponential backoff and full jitter; everything else raises immediately.
//! The policy bounds both the attempt count and the total elapsed time of one
//! logical fetch.

use crate::extractor::config::{
    INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRIES, MAX_RETRY_ELAPSED_SECS,
};
use rand::Rng;
use std::time::Duration;

/// Classification of one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Network timeout or connection stalled long enough to trigger a timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400 invalid request
    InvalidRequest,
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 | 403 => Self::AuthFailed(status),
            429 => Self::RateLimit,
            s if (500..600).contains(&s) => Self::ServerError(s),
            s if (400..500).contains(&s) => Self::ClientError(s),
            _ => Self::NetworkGeneric,
        }
    }

    /// Classify a transport-level failure.
    pub fn from_transport(timeout: bool, connect: bool) -> Self {
        if timeout {
            Self::NetworkTimeout
        } else if connect {
            Self::NetworkOffline
        } else {
            Self::NetworkGeneric
        }
    }

    /// Description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::AuthFailed(code) => match code {
                401 => "authentication failed (401)",
                403 => "authentication failed (403)",
                _ => "authentication failed",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                _ => "client error",
            },
            Self::NetworkGeneric => "network error",
        }
    }

    /// Whether this failure class is retried at all.
    ///
    /// Retryable: transport errors and HTTP 429/500/502/503/504. Every other
    /// status raises immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout
                | Self::NetworkOffline
                | Self::NetworkGeneric
                | Self::RateLimit
                | Self::ServerError(500 | 502 | 503 | 504)
        )
    }
}

/// Bounded, jittered exponential backoff policy for one logical fetch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt
    pub max_retries: usize,
    /// Backoff base delay
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// Bound on total elapsed time across all attempts of one fetch
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            max_elapsed: Duration::from_secs(MAX_RETRY_ELAPSED_SECS),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed for this failure.
    ///
    /// `attempt` is zero-based: the failure of attempt `n` permits retry
    /// `n + 1` while `n < max_retries` and the elapsed budget holds.
    pub fn should_retry(&self, error: &RetryErrorType, attempt: usize, elapsed: Duration) -> bool {
        error.is_retryable() && attempt < self.max_retries && elapsed < self.max_elapsed
    }

    /// Deterministic backoff ceiling for the given attempt: the base delay
    /// doubled per attempt, capped at `max_backoff`.
    pub fn backoff_ceiling(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt).unwrap_or(u32::MAX).min(31);
        let ceiling_ms = self
            .initial_backoff
            .as_millis()
            .saturating_mul(1u128 << exp)
            .min(self.max_backoff.as_millis());
        Duration::from_millis(ceiling_ms as u64)
    }

    /// Backoff delay with full jitter: uniform in `[0, ceiling]`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let jittered = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(jittered)
    }
}
