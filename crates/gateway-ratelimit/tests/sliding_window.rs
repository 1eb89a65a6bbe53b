//! Ignored by default — run with
//! `COUNTER_STORE_TEST_URL=redis://127.0.0.1:6379/15 cargo test -- --ignored`.

use std::time::Duration;

use gateway_counters::CounterStore;
use gateway_ratelimit::{RateLimiter, SlidingWindowLimiter, TokenBucketLimiter};

async fn store() -> CounterStore {
    let url = std::env::var("COUNTER_STORE_TEST_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
    CounterStore::connect(&url, Duration::from_secs(5))
        .await
        .expect("connect to counter store")
}

#[tokio::test]
#[ignore]
async fn sliding_window_enforces_the_limit_per_key() {
    let limiter = SlidingWindowLimiter::new(store().await);
    let key = format!("k1-{}", std::process::id());

    assert!(limiter.check(&key, 2).await.unwrap().allowed);
    assert!(limiter.check(&key, 2).await.unwrap().allowed);
    assert!(!limiter.check(&key, 2).await.unwrap().allowed);
}

#[tokio::test]
#[ignore]
async fn token_bucket_enforces_the_limit_per_key() {
    let limiter = TokenBucketLimiter::new(store().await);
    let key = format!("k2-{}", std::process::id());

    assert!(limiter.check(&key, 1).await.unwrap().allowed);
    assert!(!limiter.check(&key, 1).await.unwrap().allowed);
}

#[tokio::test]
#[ignore]
async fn limit_zero_never_denies() {
    let limiter = SlidingWindowLimiter::new(store().await);
    let key = format!("k3-{}", std::process::id());
    for _ in 0..20 {
        assert!(limiter.check(&key, 0).await.unwrap().allowed);
    }
}
