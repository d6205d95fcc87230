//! Daily rollup keys and deltas
//!
//! A rollup row is keyed by `(customer_id, date, model, user_id, feature)` and
//! holds running totals for that key. Rows are only ever changed by adding the
//! delta of a freshly appended event, see [`crate::database::RollupsDao`].

use crate::database::entities::NewUsageEvent;
use crate::pricing::cost_to_nanos;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of one daily rollup row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RollupKey {
    pub customer_id: Uuid,
    pub date: NaiveDate,
    pub model: String,
    pub user_id: String,
    pub feature: String,
}

impl RollupKey {
    /// Key for an event, using the UTC day of its own timestamp so backfilled
    /// events land in their historical day
    pub fn for_event(event: &NewUsageEvent) -> Self {
        Self {
            customer_id: event.customer_id,
            date: event.timestamp.date_naive(),
            model: event.model.clone(),
            user_id: event.user_id.clone().unwrap_or_default(),
            feature: event.feature.clone().unwrap_or_default(),
        }
    }
}

/// Amount one event adds to its rollup row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupDelta {
    pub calls: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_nanos: i64,
}

impl RollupDelta {
    /// `None` when the event's cost cannot be represented in nano-USD
    pub fn for_event(event: &NewUsageEvent) -> Option<Self> {
        Some(Self {
            calls: 1,
            input_tokens: event.input_tokens,
            output_tokens: event.output_tokens,
            cost_nanos: cost_to_nanos(event.cost.total_cost)?,
        })
    }
}

/// A rollup column results can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Date,
    Model,
    UserId,
    Feature,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Date => "date",
            Dimension::Model => "model",
            Dimension::UserId => "user_id",
            Dimension::Feature => "feature",
        }
    }

    /// Parse a comma-separated list such as `model,user_id`, dropping repeats
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        let mut dimensions = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let dimension = part.parse::<Dimension>()?;
            if !dimensions.contains(&dimension) {
                dimensions.push(dimension);
            }
        }
        Ok(dimensions)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" | "day" => Ok(Dimension::Date),
            "model" => Ok(Dimension::Model),
            "user_id" | "user" => Ok(Dimension::UserId),
            "feature" => Ok(Dimension::Feature),
            other => Err(format!("unknown group_by dimension '{}'", other)),
        }
    }
}
