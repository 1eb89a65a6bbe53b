use serde_json::Value as JsonValue;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct ApiKeyRow {
    pub id: i64,
    pub name: String,
    pub secret_hash: String,
    pub allowed_models: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub monthly_budget_usd_micros: Option<i64>,
    pub enabled: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub tags: JsonValue,
}

#[derive(Debug, Clone)]
pub struct ProviderRow {
    pub id: i64,
    pub name: String,
    pub type_tag: String,
    pub enabled: bool,
    pub credential_blob: Vec<u8>,
    pub config_json: JsonValue,
}

#[derive(Debug, Clone)]
pub struct ModelRow {
    pub id: i64,
    pub provider_id: i64,
    pub name: String,
    pub input_price_per_1k_usd_micros: i64,
    pub output_price_per_1k_usd_micros: i64,
}

#[derive(Debug, Clone)]
pub struct AliasRow {
    pub id: i64,
    pub alias: String,
    pub model_id: i64,
    pub provider_override_id: Option<i64>,
    pub enabled: bool,
}

/// Everything the provider registry needs to rebuild its four maps in one
/// reload pass (spec.md §4.5 "Reload").
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub providers: Vec<ProviderRow>,
    pub models: Vec<ModelRow>,
    pub aliases: Vec<AliasRow>,
}
