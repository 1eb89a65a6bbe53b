use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "model_aliases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Uniqueness is enforced among *enabled* rows only, so it cannot be a
    /// plain unique column constraint; the registry reload enforces it
    /// in-memory when it builds the alias map (spec.md §3 Alias).
    pub alias: String,
    pub model_id: i64,
    pub provider_override_id: Option<i64>,
    pub enabled: bool,
    #[sea_orm(belongs_to, from = "model_id", to = "id", on_delete = "Cascade")]
    pub model: HasOne<super::models::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
