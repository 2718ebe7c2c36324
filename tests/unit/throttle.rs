//! Tests for minimum-interval throttling

use market_data_extractor::Throttle;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_back_to_back_acquires_respect_min_interval() {
    let throttle = Throttle::new(Duration::from_millis(50));

    throttle.acquire().await;
    let after_first = Instant::now();
    throttle.acquire().await;

    assert!(
        after_first.elapsed() >= Duration::from_millis(50),
        "second acquire returned after only {:?}",
        after_first.elapsed()
    );
}

#[tokio::test]
async fn test_spaced_acquires_do_not_block() {
    let throttle = Throttle::new(Duration::from_millis(20)).with_jitter(Duration::ZERO);

    throttle.acquire().await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let start = Instant::now();
    throttle.acquire().await;
    assert!(start.elapsed() < Duration::from_millis(15));
}

#[tokio::test]
async fn test_concurrent_callers_serialize_through_shared_instance() {
    let throttle = Arc::new(Throttle::new(Duration::from_millis(40)).with_jitter(Duration::ZERO));
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let throttle = throttle.clone();
        handles.push(tokio::spawn(async move {
            throttle.acquire().await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Three callers on one throttle need at least two full intervals.
    assert!(
        start.elapsed() >= Duration::from_millis(80),
        "three concurrent acquires finished in {:?}",
        start.elapsed()
    );
}
