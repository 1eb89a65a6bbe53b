use async_trait::async_trait;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::snapshot::{ApiKeyRow, RegistrySnapshot};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("serde json error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not found")]
    NotFound,
}

#[derive(Debug, Clone)]
pub struct NewApiKeyInput {
    pub name: String,
    pub secret_hash: String,
    pub allowed_models: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub monthly_budget_usd_micros: Option<i64>,
    pub expires_at: Option<OffsetDateTime>,
    pub tags: JsonValue,
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeyPatch {
    pub name: Option<String>,
    pub allowed_models: Option<Vec<String>>,
    pub rate_limit_per_minute: Option<u32>,
    pub monthly_budget_usd_micros: Option<Option<i64>>,
    pub enabled: Option<bool>,
    pub expires_at: Option<Option<OffsetDateTime>>,
    pub tags: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct UsageRecordInput {
    pub api_key_id: i64,
    pub model_id: i64,
    pub provider_id: i64,
    pub requested_at: OffsetDateTime,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost_usd_micros: i64,
    pub request_summary: Option<String>,
    pub response_summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MonthlyUsageSummaryUpsert {
    pub api_key_id: i64,
    pub year: i32,
    pub month: i32,
    pub total_cost_usd_micros: i64,
    pub total_requests: i64,
}

/// Durable storage for the key/model store (spec.md §3) and the registry's
/// reload source (spec.md §4.5).
///
/// Runtime reads on the hot path must not hit this trait directly except as
/// the cache-aside fallback on a cache miss (spec.md §4.1 stage 3) and the
/// registry's periodic reload; every other lookup is served from an
/// in-memory snapshot or cache.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Entity-first schema sync, run once at bootstrap.
    async fn sync(&self) -> StorageResult<()>;

    async fn get_api_key_by_secret_hash(&self, hash: &str) -> StorageResult<Option<ApiKeyRow>>;
    async fn insert_api_key(&self, input: NewApiKeyInput) -> StorageResult<ApiKeyRow>;
    async fn patch_api_key(&self, id: i64, patch: ApiKeyPatch) -> StorageResult<ApiKeyRow>;
    async fn delete_api_key(&self, id: i64) -> StorageResult<()>;
    /// Ids of currently-enabled keys, for the budget reconciler's sweep
    /// (spec.md §4.4 "scans monthly accumulators").
    async fn list_enabled_api_key_ids(&self) -> StorageResult<Vec<i64>>;

    async fn load_registry_snapshot(&self) -> StorageResult<RegistrySnapshot>;

    async fn upsert_provider(
        &self,
        name: &str,
        type_tag: &str,
        credential_blob: Vec<u8>,
        config_json: JsonValue,
        enabled: bool,
    ) -> StorageResult<i64>;
    async fn set_provider_enabled(&self, provider_id: i64, enabled: bool) -> StorageResult<()>;

    async fn upsert_model(
        &self,
        provider_id: i64,
        name: &str,
        input_price_per_1k_usd_micros: i64,
        output_price_per_1k_usd_micros: i64,
    ) -> StorageResult<i64>;

    async fn upsert_alias(
        &self,
        alias: &str,
        model_id: i64,
        provider_override_id: Option<i64>,
        enabled: bool,
    ) -> StorageResult<i64>;

    async fn append_usage_record(&self, record: UsageRecordInput) -> StorageResult<()>;

    /// Idempotent on `(api_key_id, year, month)` (spec.md §8 "Monthly
    /// reconciliation is idempotent").
    async fn upsert_monthly_summary(&self, summary: MonthlyUsageSummaryUpsert) -> StorageResult<()>;
}
