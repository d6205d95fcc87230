//! Read path over daily rollups and raw events
//!
//! Nothing here writes. Every query runs under the configured timeout.

pub mod config;
mod cursor;
mod types;

pub use config::QueryConfig;
pub use cursor::EventCursor;
pub use types::{
    CostSummary, DailyCost, DateRange, DimensionCost, EventFilter, EventPage, EventView,
    PageRequest, RollupRow,
};

use crate::aggregation::Dimension;
use crate::database::{DatabaseManager, EventQuery};
use crate::pricing::cost_from_nanos;
use chrono::{Duration, NaiveDate, Utc};
use futures_util::{Stream, TryStreamExt, stream};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Allowed `days` for summaries and breakdowns
pub const MAX_SUMMARY_DAYS: u32 = 90;

/// Row cap for per-user and per-feature breakdowns
pub const BREAKDOWN_LIMIT: usize = 50;

/// Breakdown key for events sent without a `user_id`
pub const UNATTRIBUTED_USER: &str = "(no user)";

/// Breakdown key for events sent without a `feature`
pub const UNATTRIBUTED_FEATURE: &str = "(no feature)";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    Validation(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Query timed out after {0} ms")]
    Timeout(u64),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<crate::database::DatabaseError> for QueryError {
    fn from(err: crate::database::DatabaseError) -> Self {
        QueryError::Database(err.to_string())
    }
}

pub struct QueryService {
    database: Arc<dyn DatabaseManager>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(database: Arc<dyn DatabaseManager>, config: &QueryConfig) -> Self {
        Self {
            database,
            config: config.clone(),
        }
    }

    /// Summed rollups grouped by `dimensions`.
    ///
    /// Ordered by date ascending when grouped by date, then total cost
    /// descending, then the dimension values ascending.
    pub async fn query_rollups(
        &self,
        customer_id: Uuid,
        range: DateRange,
        dimensions: &[Dimension],
    ) -> Result<Vec<RollupRow>, QueryError> {
        self.check_range(&range)?;

        let totals = self
            .bounded(async {
                let totals = self
                    .database
                    .rollups()
                    .grouped_totals(customer_id, range.start, range.end, dimensions)
                    .await?;
                Ok::<_, QueryError>(totals)
            })
            .await?;

        let mut rows: Vec<RollupRow> = totals.into_iter().map(RollupRow::from).collect();
        rows.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| b.total_cost.cmp(&a.total_cost))
                .then_with(|| a.model.cmp(&b.model))
                .then_with(|| a.user_id.cmp(&b.user_id))
                .then_with(|| a.feature.cmp(&b.feature))
        });

        debug!(
            customer_id = %customer_id,
            start = %range.start,
            end = %range.end,
            groups = rows.len(),
            "Rollup query"
        );
        Ok(rows)
    }

    /// Default range: the last `default_window_days` days up to today
    pub fn default_range(&self) -> DateRange {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(i64::from(self.config.default_window_days.max(1)) - 1);
        DateRange::new(start, end)
    }

    /// One page of raw events, newest first
    pub async fn query_events(
        &self,
        customer_id: Uuid,
        filter: EventFilter,
        page: PageRequest,
    ) -> Result<EventPage, QueryError> {
        let limit = self.page_size(page.limit)?;
        let cursor = page
            .cursor
            .as_deref()
            .map(EventCursor::decode)
            .transpose()
            .map_err(QueryError::InvalidCursor)?;

        let (start, end) = match &cursor {
            Some(cursor) => {
                // Client-supplied like any other window
                self.check_window(cursor.window_start, cursor.window_end)
                    .map_err(|e| match e {
                        QueryError::Validation(msg) => QueryError::InvalidCursor(msg),
                        other => other,
                    })?;
                (cursor.window_start, cursor.window_end)
            }
            None => self.event_window(&filter)?,
        };

        let query = EventQuery {
            start,
            end,
            model: filter.model,
            user_id: filter.user_id,
            feature: filter.feature,
            after: cursor.as_ref().map(|c| (c.timestamp, c.id)),
            // One extra row tells whether another page exists
            limit: limit + 1,
        };

        let mut events = self
            .bounded(async {
                let events = self.database.events().page(customer_id, &query).await?;
                Ok::<_, QueryError>(events)
            })
            .await?;

        let has_more = events.len() as u64 > limit;
        events.truncate(limit as usize);

        let next_cursor = match events.last() {
            Some(last) if has_more => Some(
                EventCursor {
                    timestamp: last.timestamp,
                    id: last.id,
                    window_start: start,
                    window_end: end,
                }
                .encode(),
            ),
            _ => None,
        };

        Ok(EventPage {
            events: events.into_iter().map(EventView::from).collect(),
            next_cursor,
        })
    }

    /// Lazily page through every matching event, starting at `cursor` if given.
    /// Each page is fetched only when the previous one has been consumed.
    pub fn stream_events(
        &self,
        customer_id: Uuid,
        filter: EventFilter,
        cursor: Option<String>,
    ) -> impl Stream<Item = Result<EventView, QueryError>> + '_ {
        stream::try_unfold(
            (filter, cursor, false),
            move |(filter, cursor, exhausted)| async move {
                if exhausted {
                    return Ok(None);
                }

                let page = self
                    .query_events(
                        customer_id,
                        filter.clone(),
                        PageRequest {
                            cursor,
                            limit: None,
                        },
                    )
                    .await?;

                let exhausted = page.next_cursor.is_none();
                let events = stream::iter(page.events.into_iter().map(Ok::<_, QueryError>));
                Ok::<_, QueryError>(Some((events, (filter, page.next_cursor, exhausted))))
            },
        )
        .try_flatten()
    }

    /// Totals and per-day costs over the last `days` days
    pub async fn summary(&self, customer_id: Uuid, days: u32) -> Result<CostSummary, QueryError> {
        let range = summary_range(days)?;
        let rollups = self.database.rollups();

        let (totals, daily) = self
            .bounded(async {
                let totals = rollups
                    .grouped_totals(customer_id, range.start, range.end, &[])
                    .await?;
                let daily = rollups
                    .grouped_totals(customer_id, range.start, range.end, &[Dimension::Date])
                    .await?;
                Ok::<_, QueryError>((totals, daily))
            })
            .await?;

        let by_date: HashMap<NaiveDate, _> = daily
            .into_iter()
            .filter_map(|row| row.date.map(|date| (date, row)))
            .collect();

        let daily = range
            .start
            .iter_days()
            .take_while(|date| *date <= range.end)
            .map(|date| match by_date.get(&date) {
                Some(row) => DailyCost {
                    date,
                    calls: row.total_calls,
                    input_tokens: row.total_input_tokens,
                    output_tokens: row.total_output_tokens,
                    cost: cost_from_nanos(row.total_cost_nanos),
                },
                None => DailyCost {
                    date,
                    calls: 0,
                    input_tokens: 0,
                    output_tokens: 0,
                    cost: cost_from_nanos(0),
                },
            })
            .collect();

        let total = totals.into_iter().next();
        Ok(CostSummary {
            days,
            start_date: range.start,
            end_date: range.end,
            total_calls: total.as_ref().map_or(0, |t| t.total_calls),
            total_input_tokens: total.as_ref().map_or(0, |t| t.total_input_tokens),
            total_output_tokens: total.as_ref().map_or(0, |t| t.total_output_tokens),
            total_cost: cost_from_nanos(total.as_ref().map_or(0, |t| t.total_cost_nanos)),
            daily,
        })
    }

    /// Cost per value of one dimension over the last `days` days, most expensive first.
    /// Spend without a user or feature is reported under [`UNATTRIBUTED_USER`] or
    /// [`UNATTRIBUTED_FEATURE`], so the rows always add up to the total. Per-user and
    /// per-feature results are capped at [`BREAKDOWN_LIMIT`] rows.
    pub async fn cost_by(
        &self,
        customer_id: Uuid,
        dimension: Dimension,
        days: u32,
    ) -> Result<Vec<DimensionCost>, QueryError> {
        let range = summary_range(days)?;
        let limit = match dimension {
            Dimension::Model => None,
            Dimension::UserId | Dimension::Feature => Some(BREAKDOWN_LIMIT),
            Dimension::Date => {
                return Err(QueryError::Validation(
                    "use the summary for a per-day breakdown".to_string(),
                ));
            }
        };

        let rows = self.query_rollups(customer_id, range, &[dimension]).await?;

        let costs = rows
            .into_iter()
            .filter_map(|row| {
                let key = match dimension {
                    Dimension::Model => row.model.clone(),
                    Dimension::UserId => row.user_id.clone(),
                    Dimension::Feature => row.feature.clone(),
                    Dimension::Date => None,
                }?;
                let key = match (key.is_empty(), dimension) {
                    (true, Dimension::UserId) => UNATTRIBUTED_USER.to_string(),
                    (true, Dimension::Feature) => UNATTRIBUTED_FEATURE.to_string(),
                    _ => key,
                };
                Some(DimensionCost {
                    key,
                    calls: row.total_calls,
                    input_tokens: row.total_input_tokens,
                    output_tokens: row.total_output_tokens,
                    total_cost: row.total_cost,
                })
            })
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        Ok(costs)
    }

    fn check_range(&self, range: &DateRange) -> Result<(), QueryError> {
        if range.start > range.end {
            return Err(QueryError::Validation(format!(
                "start {} is after end {}",
                range.start, range.end
            )));
        }
        if range.days() > i64::from(self.config.max_window_days) {
            return Err(QueryError::Validation(format!(
                "range of {} days exceeds the maximum of {}",
                range.days(),
                self.config.max_window_days
            )));
        }
        Ok(())
    }

    fn event_window(
        &self,
        filter: &EventFilter,
    ) -> Result<(chrono::DateTime<Utc>, chrono::DateTime<Utc>), QueryError> {
        let end = filter.end.unwrap_or_else(Utc::now);
        let start = filter
            .start
            .unwrap_or_else(|| end - Duration::days(i64::from(self.config.default_window_days)));

        self.check_window(start, end)?;
        Ok((start, end))
    }

    fn check_window(
        &self,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> Result<(), QueryError> {
        if start >= end {
            return Err(QueryError::Validation(format!(
                "start {} must be before end {}",
                start, end
            )));
        }
        if end - start > Duration::days(i64::from(self.config.max_window_days)) {
            return Err(QueryError::Validation(format!(
                "time window exceeds the maximum of {} days",
                self.config.max_window_days
            )));
        }
        Ok(())
    }

    fn page_size(&self, requested: Option<u64>) -> Result<u64, QueryError> {
        match requested {
            None => Ok(self.config.default_page_size.min(self.config.max_page_size)),
            Some(0) => Err(QueryError::Validation("limit must be at least 1".to_string())),
            Some(limit) => Ok(limit.min(self.config.max_page_size)),
        }
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, QueryError>>,
    {
        match tokio::time::timeout(self.config.timeout(), query).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.config.timeout_ms, "Query timed out");
                Err(QueryError::Timeout(self.config.timeout_ms))
            }
        }
    }
}

fn summary_range(days: u32) -> Result<DateRange, QueryError> {
    if !(1..=MAX_SUMMARY_DAYS).contains(&days) {
        return Err(QueryError::Validation(format!(
            "days must be between 1 and {}, got {}",
            MAX_SUMMARY_DAYS, days
        )));
    }
    let end = Utc::now().date_naive();
    let start = end - Duration::days(i64::from(days) - 1);
    Ok(DateRange::new(start, end))
}
