//! Integration tests against a real counter store. Ignored by default —
//! run with `COUNTER_STORE_TEST_URL=redis://127.0.0.1:6379/15 cargo test -- --ignored`.

use std::time::Duration;

use gateway_counters::CounterStore;

async fn test_store() -> CounterStore {
    let url = std::env::var("COUNTER_STORE_TEST_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
    CounterStore::connect(&url, Duration::from_secs(5))
        .await
        .expect("connect to counter store")
}

#[tokio::test]
#[ignore]
async fn sliding_window_allows_up_to_limit_then_denies() {
    let store = test_store().await;
    let key = format!("test:{}", uuid_like());

    for i in 0..2 {
        let decision = store
            .sliding_window_check(&key, 1_000 + i, 60_000, 2, &format!("m{i}"), 120)
            .await
            .unwrap();
        assert!(decision.allowed, "request {i} should be allowed");
    }

    let decision = store
        .sliding_window_check(&key, 1_002, 60_000, 2, "m2", 120)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.count, 3);
}

#[tokio::test]
#[ignore]
async fn sliding_window_limit_zero_is_unlimited() {
    let store = test_store().await;
    let key = format!("test:{}", uuid_like());
    for i in 0..50 {
        let decision = store
            .sliding_window_check(&key, 1_000 + i, 60_000, 0, &format!("m{i}"), 120)
            .await
            .unwrap();
        assert!(decision.allowed);
    }
}

#[tokio::test]
#[ignore]
async fn budget_incr_accumulates_and_reads_back() {
    let store = test_store().await;
    let key = format!("test:{}", uuid_like());
    let (total, requests) = store.budget_incr_micros(&key, "2026:08", 9_990_000, 60 * 86_400).await.unwrap();
    assert_eq!(total, 9_990_000);
    assert_eq!(requests, 1);
    let (total, requests) = store.budget_incr_micros(&key, "2026:08", 20_000, 60 * 86_400).await.unwrap();
    assert_eq!(total, 10_010_000);
    assert_eq!(requests, 2);
    assert_eq!(store.budget_get_micros(&key, "2026:08").await.unwrap(), 10_010_000);
    assert_eq!(store.budget_request_count(&key, "2026:08").await.unwrap(), 2);
}

fn uuid_like() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}
