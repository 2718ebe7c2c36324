//! Shared HTTP clients for all fetcher instances.
//!
//! Two timeout profiles: a short one for ordinary JSON requests and a long
//! one for bulk/CSV exports, which the upstream streams slowly. Both clients
//! are process-wide so connection pooling works across every extraction.
//!
//! Throttles are deliberately NOT here: each upstream target gets its own
//! owned [`crate::Throttle`] instance injected where it is used.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// HTTP connect timeout (seconds), time to establish the TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Request timeout (seconds) for ordinary JSON fetches
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Request timeout (seconds) for bulk/CSV exports
const HTTP_BULK_TIMEOUT_SECS: u64 = 300;

/// Global short-timeout HTTP client shared by all fetcher instances.
pub static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build HTTP client: {e}. Check system TLS configuration.");
            }),
    )
});

/// Global long-timeout HTTP client for bulk/CSV fetches.
pub static GLOBAL_BULK_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_BULK_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build bulk HTTP client: {e}. Check system TLS configuration.");
            }),
    )
});

/// Get the global short-timeout HTTP client (cheap `Arc` clone).
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}

/// Get the global bulk HTTP client (cheap `Arc` clone).
pub fn global_bulk_http_client() -> Arc<Client> {
    GLOBAL_BULK_HTTP_CLIENT.clone()
}
