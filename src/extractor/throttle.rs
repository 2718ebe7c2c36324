//! Minimum-interval throttling shared across callers.
//!
//! One [`Throttle`] instance per distinct upstream target. Callers running
//! partitions concurrently must funnel through the same instance (behind an
//! `Arc`) so the minimum inter-call interval holds globally, not per task.
//! This is the only cross-partition shared mutable state in the engine, and
//! it is always an owned, injected object rather than a process global.

use crate::extractor::config::{MIN_CALL_INTERVAL_MS, THROTTLE_JITTER_MS};
use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Enforces a minimum interval between outbound calls.
pub struct Throttle {
    min_interval: Duration,
    jitter: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Create a throttle with the given minimum inter-call interval.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            jitter: Duration::from_millis(THROTTLE_JITTER_MS),
            last_call: Mutex::new(None),
        }
    }

    /// Override the post-wait jitter bound (zero disables it).
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// The configured minimum inter-call interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until at least the minimum interval has elapsed since the last
    /// permitted call on this instance, then record the new timestamp.
    ///
    /// The last-call read-modify-write happens under one mutex, so concurrent
    /// callers serialize and each reserves its own slot. A caller that had to
    /// wait sleeps an extra uniform delay in `[0, jitter]` after releasing
    /// the lock, desynchronizing callers queued on the same boundary.
    pub async fn acquire(&self) {
        let waited = {
            let mut last_call = self.last_call.lock().await;
            let wait = match *last_call {
                Some(last) => self.min_interval.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            };
            if !wait.is_zero() {
                sleep(wait).await;
            }
            *last_call = Some(Instant::now());
            !wait.is_zero()
        };

        if waited && !self.jitter.is_zero() {
            let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
            sleep(Duration::from_millis(extra)).await;
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_millis(MIN_CALL_INTERVAL_MS))
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("min_interval", &self.min_interval)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}
