use sea_orm::entity::prelude::*;

/// Admin-authored annotations on a key that are not authorization-relevant
/// (kept separate from `api_keys.tags` for schema parity with spec.md §6's
/// table list; not read on the hot path).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "key_metadata")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub api_key_id: i64,
    pub key: String,
    pub value: String,
    #[sea_orm(belongs_to, from = "api_key_id", to = "id", on_delete = "Cascade")]
    pub api_key: HasOne<super::api_keys::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
