//! Needs a live counter store: `COUNTER_STORE_TEST_URL=redis://127.0.0.1:6379/15 cargo test -- --ignored`.
//!
//! Exercises the spec.md §8 scenario-4 boundary: a request that lands the
//! accumulator exactly on the budget still succeeds (the check only ever
//! looks at cost already recorded, never the cost about to be added), and
//! the *next* request then sees the account over budget.

use std::time::Duration;

use gateway_budget::BudgetAccountant;
use gateway_counters::CounterStore;
use time::OffsetDateTime;

async fn test_counters() -> CounterStore {
    let url =
        std::env::var("COUNTER_STORE_TEST_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
    CounterStore::connect(&url, Duration::from_secs(5)).await.unwrap()
}

#[tokio::test]
#[ignore]
async fn a_call_that_pushes_the_accumulator_past_budget_still_succeeds_but_the_next_one_is_rejected() {
    let api_key_id = 9_000_000 + std::process::id() as i64;
    let budget_usd_micros = 10_000_000; // $10.00
    let accountant = BudgetAccountant::new(test_counters().await);
    let now = OffsetDateTime::now_utc();

    // Accumulator starts at $9.99; a $0.02 call is about to land.
    accountant.add_usage(api_key_id, 9_990_000, now).await.unwrap();

    // Stage 7 check runs before the upstream call, against cost already on
    // the books -- $9.99 is still under the $10.00 budget, so the call goes
    // ahead even though it will push the total over.
    assert!(accountant.within_budget(api_key_id, Some(budget_usd_micros), now).await);

    // Stage 10 records the $0.02 this call actually cost, landing the
    // accumulator at $10.01.
    let (accumulated, _) = accountant.add_usage(api_key_id, 20_000, now).await.unwrap();
    assert_eq!(accumulated, 10_010_000);

    // The next request's stage 7 check now sees the account over budget.
    assert!(!accountant.within_budget(api_key_id, Some(budget_usd_micros), now).await);
}
