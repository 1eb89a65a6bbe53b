use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Advisory reporting/cold-start-recovery projection written by the budget
/// reconciler (spec.md §4.4); authoritative enforcement reads the live
/// counter-store accumulator, never this table.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "monthly_usage_summary")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub api_key_id: i64,
    pub year: i32,
    pub month: i32,
    pub total_cost_usd_micros: i64,
    pub total_requests: i64,
    pub updated_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
