use crate::pricing::cost_from_nanos;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-day totals keyed by `(customer_id, date, model, user_id, feature)`.
/// Missing `user_id` and `feature` are stored as empty strings.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "daily_cost_rollups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub customer_id: Uuid,
    pub date: NaiveDate,
    pub model: String,
    pub user_id: String,
    pub feature: String,
    pub total_calls: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost_nanos: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn total_cost(&self) -> Decimal {
        cost_from_nanos(self.total_cost_nanos)
    }
}
