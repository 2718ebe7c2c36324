//! Tests for retry behavior against a scripted transport

use crate::support::ScriptedTransport;
use market_data_extractor::fetcher::http::RetryingFetcher;
use market_data_extractor::fetcher::retry::RetryPolicy;
use market_data_extractor::fetcher::FetcherError;
use market_data_extractor::params::ParamMap;
use market_data_extractor::redact::{Redactor, REDACTION};
use market_data_extractor::Throttle;
use std::sync::Arc;
use std::time::Duration;

/// Policy with millisecond backoffs so tests run instantly.
fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 5,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        max_elapsed: Duration::from_secs(30),
    }
}

fn fetcher_over(transport: Arc<ScriptedTransport>) -> RetryingFetcher {
    RetryingFetcher::new(transport, Arc::new(Throttle::new(Duration::ZERO)))
        .with_policy(fast_policy())
}

#[tokio::test]
async fn test_503_twice_then_success_makes_exactly_three_requests() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        ScriptedTransport::status(503, "unavailable"),
        ScriptedTransport::status(503, "unavailable"),
        ScriptedTransport::status(200, r#"[{"Close": 1.5}]"#),
    ]));
    let fetcher = fetcher_over(transport.clone());

    let records = fetcher
        .fetch("https://api.example.com/eod", &ParamMap::new())
        .await
        .unwrap();

    assert_eq!(transport.calls(), 3);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["close"], serde_json::json!(1.5));
}

#[tokio::test]
async fn test_404_raises_immediately_without_retry() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::status(
        404,
        "not found",
    )]));
    let fetcher = fetcher_over(transport.clone());

    let error = fetcher
        .fetch("https://api.example.com/eod", &ParamMap::new())
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 1);
    assert!(matches!(error, FetcherError::Http { status: 404, .. }));
}

#[tokio::test]
async fn test_400_with_empty_list_body_is_clean_end_of_data() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::status(
        400, "[]",
    )]));
    let fetcher = fetcher_over(transport.clone());

    let records = fetcher
        .fetch("https://api.example.com/bulk", &ParamMap::new())
        .await
        .unwrap();

    assert_eq!(transport.calls(), 1);
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_400_with_other_body_raises_immediately() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::status(
        400,
        r#"{"error": "bad symbol"}"#,
    )]));
    let fetcher = fetcher_over(transport.clone());

    let error = fetcher
        .fetch("https://api.example.com/eod", &ParamMap::new())
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 1);
    assert!(matches!(error, FetcherError::Http { status: 400, .. }));
}

#[tokio::test]
async fn test_retries_exhausted_carries_status_and_attempts() {
    let policy = RetryPolicy {
        max_retries: 2,
        ..fast_policy()
    };
    let transport = Arc::new(ScriptedTransport::new(vec![
        ScriptedTransport::status(503, "down"),
        ScriptedTransport::status(503, "down"),
        ScriptedTransport::status(503, "down"),
    ]));
    let fetcher = RetryingFetcher::new(
        transport.clone(),
        Arc::new(Throttle::new(Duration::ZERO)),
    )
    .with_policy(policy);

    let error = fetcher
        .fetch("https://api.example.com/eod", &ParamMap::new())
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 3);
    match error {
        FetcherError::RetriesExhausted { attempts, status, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(status, Some(503));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_timeouts_are_retried() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        ScriptedTransport::timeout(),
        ScriptedTransport::timeout(),
        ScriptedTransport::status(200, "[]"),
    ]));
    let fetcher = fetcher_over(transport.clone());

    let records = fetcher
        .fetch("https://api.example.com/eod", &ParamMap::new())
        .await
        .unwrap();

    assert_eq!(transport.calls(), 3);
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_terminal_errors_redact_the_credential() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::status(
        401,
        "invalid token sekret123 supplied",
    )]));
    let fetcher = fetcher_over(transport)
        .with_redactor(Redactor::new(Some("sekret123".to_string())));

    let error = fetcher
        .fetch(
            "https://api.example.com/eod?api_token=sekret123",
            &ParamMap::new(),
        )
        .await
        .unwrap_err();

    let message = error.to_string();
    assert!(!message.contains("sekret123"), "credential leaked: {message}");
    assert!(message.contains(REDACTION));
}

#[tokio::test]
async fn test_exhausted_retry_errors_redact_the_credential() {
    let policy = RetryPolicy {
        max_retries: 1,
        ..fast_policy()
    };
    let transport = Arc::new(ScriptedTransport::new(vec![
        ScriptedTransport::status(503, "down at api_token=sekret123"),
        ScriptedTransport::status(503, "down at api_token=sekret123"),
    ]));
    let fetcher = RetryingFetcher::new(transport, Arc::new(Throttle::new(Duration::ZERO)))
        .with_policy(policy)
        .with_redactor(Redactor::new(Some("sekret123".to_string())));

    let error = fetcher
        .fetch(
            "https://api.example.com/eod?api_token=sekret123",
            &ParamMap::new(),
        )
        .await
        .unwrap_err();

    let message = error.to_string();
    assert!(!message.contains("sekret123"), "credential leaked: {message}");
}
