use crate::database::GroupedTotals;
use crate::database::entities::UsageEventRecord;
use crate::pricing::cost_from_nanos;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inclusive range of UTC days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of days covered, counting both ends
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// One group of summed rollups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    pub total_calls: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost: Decimal,
}

impl From<GroupedTotals> for RollupRow {
    fn from(totals: GroupedTotals) -> Self {
        Self {
            date: totals.date,
            model: totals.model,
            user_id: totals.user_id,
            feature: totals.feature,
            total_calls: totals.total_calls,
            total_input_tokens: totals.total_input_tokens,
            total_output_tokens: totals.total_output_tokens,
            total_cost: cost_from_nanos(totals.total_cost_nanos),
        }
    }
}

/// Optional filters for raw event reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub user_id: Option<String>,
    pub feature: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub cursor: Option<String>,
    pub limit: Option<u64>,
}

/// API view of a stored event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventView {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
    pub priced: bool,
    pub duration_ms: Option<i64>,
    pub user_id: Option<String>,
    pub feature: Option<String>,
    pub metadata: serde_json::Value,
    pub ingested_at: DateTime<Utc>,
}

impl From<UsageEventRecord> for EventView {
    fn from(event: UsageEventRecord) -> Self {
        Self {
            input_cost: event.input_cost(),
            output_cost: event.output_cost(),
            total_cost: event.total_cost(),
            id: event.id,
            timestamp: event.timestamp,
            model: event.model,
            input_tokens: event.input_tokens,
            output_tokens: event.output_tokens,
            priced: event.priced,
            duration_ms: event.duration_ms,
            user_id: event.user_id,
            feature: event.feature,
            metadata: event.metadata,
            ingested_at: event.ingested_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<EventView>,
    /// Present when more events may follow
    pub next_cursor: Option<String>,
}

/// Totals of one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCost {
    pub date: NaiveDate,
    pub calls: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: Decimal,
}

/// Totals over the last `days` days plus one entry per day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSummary {
    pub days: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_calls: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost: Decimal,
    pub daily: Vec<DailyCost>,
}

/// Totals for one value of a single dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionCost {
    pub key: String,
    pub calls: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost: Decimal,
}
