use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    #[sea_orm(unique_key = "api_key_secret_hash")]
    pub secret_hash: String,
    /// Empty array means unrestricted (spec.md §3 APIKey).
    pub allowed_models: Json,
    pub rate_limit_per_minute: i32,
    pub monthly_budget_usd_micros: Option<i64>,
    pub enabled: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub tags: Json,
    pub created_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub metadata: HasMany<super::key_metadata::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
