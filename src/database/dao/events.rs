use crate::database::entities::{NewUsageEvent, UsageEventRecord, usage_events};
use crate::database::{DatabaseError, DatabaseResult};
use crate::pricing::cost_to_nanos;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    sea_query::OnConflict,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Why an event could not be appended
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown customer: {0}")]
    UnknownCustomer(Uuid),
    #[error("Invalid event: {0}")]
    Validation(String),
    #[error("Inconsistent cost: {input} + {output} != {total}")]
    InconsistentCost {
        input: Decimal,
        output: Decimal,
        total: Decimal,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// An event with the same `(id, timestamp)` was already stored; nothing was written
    Duplicate,
}

/// Filter and keyset position for reading one page of events.
///
/// The window is half-open: `start <= timestamp < end`. Results are ordered
/// newest first by `(timestamp, id)`; `after` is the last row of the previous page.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub model: Option<String>,
    pub user_id: Option<String>,
    pub feature: Option<String>,
    pub after: Option<(DateTime<Utc>, Uuid)>,
    pub limit: u64,
}

/// Usage events DAO. Appending is only reachable through ingestion.
#[derive(Clone)]
pub struct EventsDao {
    db: DatabaseConnection,
}

impl EventsDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append one event on `conn`, which is normally an open transaction.
    ///
    /// All validation happens before the insert. A missing customer surfaces as a
    /// foreign key violation from the insert itself, so nothing is read first.
    pub(crate) async fn append<C: ConnectionTrait>(
        conn: &C,
        event: &NewUsageEvent,
    ) -> Result<AppendOutcome, StoreError> {
        let (input_cost_nanos, output_cost_nanos, total_cost_nanos) = validate(event)?;

        let active_model = usage_events::ActiveModel {
            id: Set(event.id),
            timestamp: Set(event.timestamp),
            customer_id: Set(event.customer_id),
            model: Set(event.model.clone()),
            input_tokens: Set(event.input_tokens),
            output_tokens: Set(event.output_tokens),
            input_cost_nanos: Set(input_cost_nanos),
            output_cost_nanos: Set(output_cost_nanos),
            total_cost_nanos: Set(total_cost_nanos),
            priced: Set(event.priced),
            duration_ms: Set(event.duration_ms),
            user_id: Set(event.user_id.clone()),
            feature: Set(event.feature.clone()),
            metadata: Set(event.metadata.clone()),
            ingested_at: Set(Utc::now()),
        };

        let on_conflict = OnConflict::columns([
            usage_events::Column::Id,
            usage_events::Column::Timestamp,
        ])
        .do_nothing()
        .to_owned();

        let inserted = usage_events::Entity::insert(active_model)
            .on_conflict(on_conflict)
            .exec_without_returning(conn)
            .await
            .map_err(|e| map_insert_error(e, event.customer_id))?;

        if inserted == 0 {
            debug!(event_id = %event.id, "Duplicate event ignored");
            return Ok(AppendOutcome::Duplicate);
        }

        Ok(AppendOutcome::Inserted)
    }

    pub async fn find(
        &self,
        id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> DatabaseResult<Option<UsageEventRecord>> {
        let event = usage_events::Entity::find_by_id((id, timestamp))
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(event)
    }

    /// One page of a customer's events, newest first
    pub async fn page(
        &self,
        customer_id: Uuid,
        query: &EventQuery,
    ) -> DatabaseResult<Vec<UsageEventRecord>> {
        let mut select = usage_events::Entity::find()
            .filter(usage_events::Column::CustomerId.eq(customer_id))
            .filter(usage_events::Column::Timestamp.gte(query.start))
            .filter(usage_events::Column::Timestamp.lt(query.end));

        if let Some(ref model) = query.model {
            select = select.filter(usage_events::Column::Model.eq(model));
        }
        if let Some(ref user_id) = query.user_id {
            select = select.filter(usage_events::Column::UserId.eq(user_id));
        }
        if let Some(ref feature) = query.feature {
            select = select.filter(usage_events::Column::Feature.eq(feature));
        }
        if let Some((timestamp, id)) = query.after {
            select = select.filter(
                Condition::any()
                    .add(usage_events::Column::Timestamp.lt(timestamp))
                    .add(
                        Condition::all()
                            .add(usage_events::Column::Timestamp.eq(timestamp))
                            .add(usage_events::Column::Id.lt(id)),
                    ),
            );
        }

        let events = select
            .order_by_desc(usage_events::Column::Timestamp)
            .order_by_desc(usage_events::Column::Id)
            .limit(query.limit)
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(events)
    }

    /// Every stored event of a customer, oldest first
    pub async fn list_for_customer(&self, customer_id: Uuid) -> DatabaseResult<Vec<UsageEventRecord>> {
        let events = usage_events::Entity::find()
            .filter(usage_events::Column::CustomerId.eq(customer_id))
            .order_by_asc(usage_events::Column::Timestamp)
            .order_by_asc(usage_events::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(events)
    }

    pub async fn count_for_customer(&self, customer_id: Uuid) -> DatabaseResult<u64> {
        usage_events::Entity::find()
            .filter(usage_events::Column::CustomerId.eq(customer_id))
            .count(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }
}

fn validate(event: &NewUsageEvent) -> Result<(i64, i64, i64), StoreError> {
    if event.model.trim().is_empty() {
        return Err(StoreError::Validation("model must not be empty".to_string()));
    }
    if event.input_tokens < 0 || event.output_tokens < 0 {
        return Err(StoreError::Validation(format!(
            "token counts must not be negative (input {}, output {})",
            event.input_tokens, event.output_tokens
        )));
    }
    if event.duration_ms.is_some_and(|ms| ms < 0) {
        return Err(StoreError::Validation(
            "duration_ms must not be negative".to_string(),
        ));
    }
    if !event.metadata.is_object() {
        return Err(StoreError::Validation(
            "metadata must be a JSON object".to_string(),
        ));
    }

    let cost = &event.cost;
    if !cost.is_consistent() {
        return Err(StoreError::InconsistentCost {
            input: cost.input_cost,
            output: cost.output_cost,
            total: cost.total_cost,
        });
    }
    if cost.input_cost.is_sign_negative() || cost.output_cost.is_sign_negative() {
        return Err(StoreError::Validation("costs must not be negative".to_string()));
    }

    let to_nanos = |value: Decimal| {
        cost_to_nanos(value)
            .ok_or_else(|| StoreError::Validation(format!("cost {} is out of range", value)))
    };
    let input = to_nanos(cost.input_cost)?;
    let output = to_nanos(cost.output_cost)?;
    let total = to_nanos(cost.total_cost)?;

    // Rounding to nanos must not break the sum on the stored columns
    if input + output != total {
        return Err(StoreError::InconsistentCost {
            input: cost.input_cost,
            output: cost.output_cost,
            total: cost.total_cost,
        });
    }

    Ok((input, output, total))
}

fn map_insert_error(err: DbErr, customer_id: Uuid) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => StoreError::UnknownCustomer(customer_id),
        _ => StoreError::Database(DatabaseError::Database(err.to_string())),
    }
}
