use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Append-only (spec.md §3 UsageRecord): one row per billed call.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "usage_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
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

impl ActiveModelBehavior for ActiveModel {}
