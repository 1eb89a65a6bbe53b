//! Needs a live counter store: `COUNTER_STORE_TEST_URL=redis://127.0.0.1:6379/15 cargo test -- --ignored`.

use std::collections::Mutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_budget::BudgetReconciler;
use gateway_counters::CounterStore;
use gateway_store::{
    ApiKeyPatch, ApiKeyRow, MonthlyUsageSummaryUpsert, NewApiKeyInput, RegistrySnapshot, Storage,
    StorageResult, UsageRecordInput,
};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

#[derive(Default)]
struct StubStorage {
    key_ids: Vec<i64>,
    summaries: Mutex<Vec<MonthlyUsageSummaryUpsert>>,
}

#[async_trait]
impl Storage for StubStorage {
    async fn sync(&self) -> StorageResult<()> {
        Ok(())
    }
    async fn get_api_key_by_secret_hash(&self, _hash: &str) -> StorageResult<Option<ApiKeyRow>> {
        Ok(None)
    }
    async fn insert_api_key(&self, _input: NewApiKeyInput) -> StorageResult<ApiKeyRow> {
        unimplemented!()
    }
    async fn patch_api_key(&self, _id: i64, _patch: ApiKeyPatch) -> StorageResult<ApiKeyRow> {
        unimplemented!()
    }
    async fn delete_api_key(&self, _id: i64) -> StorageResult<()> {
        Ok(())
    }
    async fn list_enabled_api_key_ids(&self) -> StorageResult<Vec<i64>> {
        Ok(self.key_ids.clone())
    }
    async fn load_registry_snapshot(&self) -> StorageResult<RegistrySnapshot> {
        Ok(RegistrySnapshot::default())
    }
    async fn upsert_provider(
        &self,
        _name: &str,
        _type_tag: &str,
        _credential_blob: Vec<u8>,
        _config_json: JsonValue,
        _enabled: bool,
    ) -> StorageResult<i64> {
        unimplemented!()
    }
    async fn set_provider_enabled(&self, _provider_id: i64, _enabled: bool) -> StorageResult<()> {
        Ok(())
    }
    async fn upsert_model(&self, _p: i64, _n: &str, _i: i64, _o: i64) -> StorageResult<i64> {
        unimplemented!()
    }
    async fn upsert_alias(&self, _a: &str, _m: i64, _p: Option<i64>, _e: bool) -> StorageResult<i64> {
        unimplemented!()
    }
    async fn append_usage_record(&self, _record: UsageRecordInput) -> StorageResult<()> {
        Ok(())
    }
    async fn upsert_monthly_summary(&self, summary: MonthlyUsageSummaryUpsert) -> StorageResult<()> {
        self.summaries.lock().unwrap().push(summary);
        Ok(())
    }
}

async fn test_counters() -> CounterStore {
    let url = std::env::var("COUNTER_STORE_TEST_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
    CounterStore::connect(&url, Duration::from_secs(5)).await.unwrap()
}

#[tokio::test]
#[ignore]
async fn reconciling_twice_over_unchanged_data_is_idempotent() {
    let counters = test_counters().await;
    let now = OffsetDateTime::now_utc();
    counters.budget_incr_micros("42", "2026:08", 1_000_000, 86_400).await.unwrap();

    let storage = Arc::new(StubStorage { key_ids: vec![42], ..Default::default() });
    let reconciler = BudgetReconciler::new(counters, storage.clone(), Duration::from_secs(300));

    reconciler.run_once(now).await.unwrap();
    reconciler.run_once(now).await.unwrap();

    let summaries = storage.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].total_cost_usd_micros, summaries[1].total_cost_usd_micros);
    assert_eq!(summaries[0].total_requests, summaries[1].total_requests);
}
