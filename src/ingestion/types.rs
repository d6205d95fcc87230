use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One usage record as sent by an instrumented client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageEventInput {
    /// Client-chosen id; together with `timestamp` it makes retries idempotent
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Event time; defaults to the time of ingestion
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl UsageEventInput {
    pub fn new(model: impl Into<String>, input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            model: model.into(),
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }
}

/// What the caller gets back for an accepted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
    pub priced: bool,
    /// The event was already stored and nothing changed
    pub duplicate: bool,
}
