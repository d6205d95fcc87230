use crate::pricing::{CostBreakdown, cost_from_nanos};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Raw usage event. Rows are written once and never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "usage_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub timestamp: DateTime<Utc>,
    pub customer_id: Uuid,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub input_cost_nanos: i64,
    pub output_cost_nanos: i64,
    pub total_cost_nanos: i64,
    pub priced: bool,
    pub duration_ms: Option<i64>,
    pub user_id: Option<String>,
    pub feature: Option<String>,
    pub metadata: Json,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn input_cost(&self) -> Decimal {
        cost_from_nanos(self.input_cost_nanos)
    }

    pub fn output_cost(&self) -> Decimal {
        cost_from_nanos(self.output_cost_nanos)
    }

    pub fn total_cost(&self) -> Decimal {
        cost_from_nanos(self.total_cost_nanos)
    }
}

/// A fully priced event ready to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewUsageEvent {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: CostBreakdown,
    pub priced: bool,
    pub duration_ms: Option<i64>,
    pub user_id: Option<String>,
    pub feature: Option<String>,
    pub metadata: serde_json::Value,
}
