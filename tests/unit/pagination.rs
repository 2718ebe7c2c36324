//! Tests for pagination termination behavior

use crate::support::{record, FnFetch};
use futures_util::StreamExt;
use market_data_extractor::fetcher::pagination::{PaginationConfig, PaginationDriver};
use market_data_extractor::fetcher::{FetchedPage, PayloadShape, Record};
use market_data_extractor::params::ParamMap;
use serde_json::json;
use std::sync::Arc;

fn list_page(records: Vec<Record>) -> FetchedPage {
    FetchedPage {
        records,
        shape: PayloadShape::List,
    }
}

/// Fetcher serving fixed per-page record batches; pages beyond the script
/// are empty.
fn paged_fetcher(pages: Vec<Vec<Record>>) -> Arc<FnFetch> {
    Arc::new(FnFetch::new(move |_params, page| {
        let page = page.expect("pagination always pins a page number") as usize;
        Ok(list_page(pages.get(page).cloned().unwrap_or_default()))
    }))
}

async fn collect(driver: &PaginationDriver) -> Vec<Record> {
    driver
        .paginate("https://api.example.com/x".to_string(), ParamMap::new())
        .map(|item| item.unwrap())
        .collect()
        .await
}

#[tokio::test]
async fn test_single_empty_page_does_not_stop_two_do() {
    // Pages 0-4: one record, one record, empty, empty, one record.
    let fetcher = paged_fetcher(vec![
        vec![record(json!({"id": "r1"}))],
        vec![record(json!({"id": "r2"}))],
        vec![],
        vec![],
        vec![record(json!({"id": "r3"}))],
    ]);
    let driver = PaginationDriver::new(fetcher.clone(), PaginationConfig::default());

    let records = collect(&driver).await;

    let ids: Vec<_> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["r1", "r2"]);
    // Two consecutive empty pages at 2 and 3 stop the run; page 4 is never fetched.
    assert_eq!(fetcher.pages_requested(), vec![Some(0), Some(1), Some(2), Some(3)]);
}

#[tokio::test]
async fn test_one_off_empty_page_is_tolerated() {
    let fetcher = paged_fetcher(vec![
        vec![record(json!({"id": "r1"}))],
        vec![],
        vec![record(json!({"id": "r2"}))],
    ]);
    let driver = PaginationDriver::new(fetcher.clone(), PaginationConfig::default());

    let records = collect(&driver).await;

    let ids: Vec<_> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["r1", "r2"]);
    assert_eq!(fetcher.pages_requested(), vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
}

#[tokio::test]
async fn test_pinned_page_fetches_exactly_one_page() {
    let fetcher = paged_fetcher(vec![
        vec![record(json!({"id": "r0"}))],
        vec![record(json!({"id": "r1"}))],
        vec![record(json!({"id": "r2"}))],
    ]);
    let config = PaginationConfig {
        pinned_page: Some(1),
        ..PaginationConfig::default()
    };
    let driver = PaginationDriver::new(fetcher.clone(), config);

    let records = collect(&driver).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], json!("r1"));
    assert_eq!(fetcher.pages_requested(), vec![Some(1)]);
}

#[tokio::test]
async fn test_non_list_response_stops_without_error() {
    let fetcher = Arc::new(FnFetch::new(|_params, page| {
        Ok(match page {
            Some(0) => list_page(vec![record(json!({"id": "r1"}))]),
            _ => FetchedPage {
                records: vec![record(json!({"error": "unexpected shape"}))],
                shape: PayloadShape::Object,
            },
        })
    }));
    let driver = PaginationDriver::new(fetcher.clone(), PaginationConfig::default());

    let mut stream =
        driver.paginate("https://api.example.com/x".to_string(), ParamMap::new());
    let mut records = Vec::new();
    while let Some(item) = stream.next().await {
        records.push(item.expect("non-list stop must not raise"));
    }

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], json!("r1"));
    assert_eq!(fetcher.call_count(), 2);
}

#[tokio::test]
async fn test_page_ceiling_stops_iteration() {
    // Every page has data; only the ceiling can stop the run.
    let fetcher = Arc::new(FnFetch::new(|_params, page| {
        Ok(list_page(vec![record(json!({"page": page.unwrap()}))]))
    }));
    let config = PaginationConfig {
        page_ceiling: 3,
        ..PaginationConfig::default()
    };
    let driver = PaginationDriver::new(fetcher.clone(), config);

    let records = collect(&driver).await;

    assert_eq!(records.len(), 3);
    assert_eq!(fetcher.pages_requested(), vec![Some(0), Some(1), Some(2)]);
}

#[tokio::test]
async fn test_start_page_resumes_iteration() {
    let fetcher = paged_fetcher(vec![
        vec![record(json!({"id": "r0"}))],
        vec![record(json!({"id": "r1"}))],
        vec![record(json!({"id": "r2"}))],
    ]);
    let config = PaginationConfig {
        start_page: 2,
        ..PaginationConfig::default()
    };
    let driver = PaginationDriver::new(fetcher.clone(), config);

    let records = collect(&driver).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], json!("r2"));
    assert_eq!(fetcher.pages_requested(), vec![Some(2), Some(3), Some(4)]);
}

#[tokio::test]
async fn test_fetch_error_surfaces_once_and_ends_stream() {
    let fetcher = Arc::new(FnFetch::new(|_params, page| match page {
        Some(0) => Ok(list_page(vec![record(json!({"id": "r1"}))])),
        _ => Err(market_data_extractor::fetcher::FetcherError::Http {
            status: 404,
            url: "https://api.example.com/x".to_string(),
            message: "gone".to_string(),
        }),
    }));
    let driver = PaginationDriver::new(fetcher, PaginationConfig::default());

    let items: Vec<_> = driver
        .paginate("https://api.example.com/x".to_string(), ParamMap::new())
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(items[1].is_err());
}
