use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub provider_id: i64,
    /// Canonical, provider-native model name. Unique with `provider_id`.
    pub name: String,
    pub input_price_per_1k_usd_micros: i64,
    pub output_price_per_1k_usd_micros: i64,
    pub capabilities: Json,
    pub metadata: Json,
    pub updated_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "provider_id", to = "id", on_delete = "Cascade")]
    pub provider: HasOne<super::providers::Entity>,
    #[sea_orm(has_many)]
    pub aliases: HasMany<super::model_aliases::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
