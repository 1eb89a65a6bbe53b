use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "provider_name")]
    pub name: String,
    /// One of `openai`, `vertexai`, `bedrock`, `custom`, ... (spec.md §3 Provider).
    pub type_tag: String,
    pub enabled: bool,
    /// AEAD ciphertext produced by `gateway-crypto`; empty for ambient-credential providers.
    pub credential_blob: Vec<u8>,
    pub config_json: Json,
    pub updated_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub models: HasMany<super::models::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
