use crate::aggregation::{Dimension, RollupDelta, RollupKey};
use crate::database::entities::{DailyCostRollup, daily_cost_rollups};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::{Alias, Expr, Func, OnConflict, SimpleExpr},
};
use uuid::Uuid;

/// Summed rollup counters for one group. Dimensions that were not grouped on are `None`.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct GroupedTotals {
    pub date: Option<NaiveDate>,
    pub model: Option<String>,
    pub user_id: Option<String>,
    pub feature: Option<String>,
    pub total_calls: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost_nanos: i64,
}

/// Daily rollups DAO. Incrementing is only reachable through ingestion.
#[derive(Clone)]
pub struct RollupsDao {
    db: DatabaseConnection,
}

impl RollupsDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Add `delta` to the row for `key`, creating it if needed.
    ///
    /// One `INSERT .. ON CONFLICT DO UPDATE SET col = col + excluded.col` statement;
    /// the row is never read first, so concurrent increments on the same key compose.
    pub(crate) async fn increment<C: ConnectionTrait>(
        conn: &C,
        key: &RollupKey,
        delta: &RollupDelta,
    ) -> DatabaseResult<()> {
        let active_model = daily_cost_rollups::ActiveModel {
            id: ActiveValue::NotSet,
            customer_id: Set(key.customer_id),
            date: Set(key.date),
            model: Set(key.model.clone()),
            user_id: Set(key.user_id.clone()),
            feature: Set(key.feature.clone()),
            total_calls: Set(delta.calls),
            total_input_tokens: Set(delta.input_tokens),
            total_output_tokens: Set(delta.output_tokens),
            total_cost_nanos: Set(delta.cost_nanos),
            updated_at: Set(Utc::now()),
        };

        let on_conflict = OnConflict::columns([
            daily_cost_rollups::Column::CustomerId,
            daily_cost_rollups::Column::Date,
            daily_cost_rollups::Column::Model,
            daily_cost_rollups::Column::UserId,
            daily_cost_rollups::Column::Feature,
        ])
        .value(
            daily_cost_rollups::Column::TotalCalls,
            accumulate(daily_cost_rollups::Column::TotalCalls),
        )
        .value(
            daily_cost_rollups::Column::TotalInputTokens,
            accumulate(daily_cost_rollups::Column::TotalInputTokens),
        )
        .value(
            daily_cost_rollups::Column::TotalOutputTokens,
            accumulate(daily_cost_rollups::Column::TotalOutputTokens),
        )
        .value(
            daily_cost_rollups::Column::TotalCostNanos,
            accumulate(daily_cost_rollups::Column::TotalCostNanos),
        )
        .update_column(daily_cost_rollups::Column::UpdatedAt)
        .to_owned();

        daily_cost_rollups::Entity::insert(active_model)
            .on_conflict(on_conflict)
            .exec_without_returning(conn)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn find_by_key(&self, key: &RollupKey) -> DatabaseResult<Option<DailyCostRollup>> {
        let rollup = daily_cost_rollups::Entity::find()
            .filter(daily_cost_rollups::Column::CustomerId.eq(key.customer_id))
            .filter(daily_cost_rollups::Column::Date.eq(key.date))
            .filter(daily_cost_rollups::Column::Model.eq(key.model.as_str()))
            .filter(daily_cost_rollups::Column::UserId.eq(key.user_id.as_str()))
            .filter(daily_cost_rollups::Column::Feature.eq(key.feature.as_str()))
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(rollup)
    }

    /// Raw rollup rows of a customer between two dates, both inclusive
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DatabaseResult<Vec<DailyCostRollup>> {
        let rollups = daily_cost_rollups::Entity::find()
            .filter(daily_cost_rollups::Column::CustomerId.eq(customer_id))
            .filter(daily_cost_rollups::Column::Date.gte(start))
            .filter(daily_cost_rollups::Column::Date.lte(end))
            .order_by_asc(daily_cost_rollups::Column::Date)
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(rollups)
    }

    /// Sum rollup rows between two dates (inclusive), grouped by `dimensions`.
    /// No dimensions gives a single grand-total row (absent when nothing matched).
    pub async fn grouped_totals(
        &self,
        customer_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        dimensions: &[Dimension],
    ) -> DatabaseResult<Vec<GroupedTotals>> {
        let mut select = daily_cost_rollups::Entity::find()
            .select_only()
            .filter(daily_cost_rollups::Column::CustomerId.eq(customer_id))
            .filter(daily_cost_rollups::Column::Date.gte(start))
            .filter(daily_cost_rollups::Column::Date.lte(end));

        for dimension in [
            Dimension::Date,
            Dimension::Model,
            Dimension::UserId,
            Dimension::Feature,
        ] {
            let column = dimension_column(dimension);
            if dimensions.contains(&dimension) {
                select = select.column(column).group_by(column);
            } else {
                select = select.column_as(Expr::cust("NULL"), dimension.as_str());
            }
        }

        let rows = select
            .column_as(sum(daily_cost_rollups::Column::TotalCalls), "total_calls")
            .column_as(
                sum(daily_cost_rollups::Column::TotalInputTokens),
                "total_input_tokens",
            )
            .column_as(
                sum(daily_cost_rollups::Column::TotalOutputTokens),
                "total_output_tokens",
            )
            .column_as(
                sum(daily_cost_rollups::Column::TotalCostNanos),
                "total_cost_nanos",
            )
            .into_model::<GroupedTotals>()
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        // An ungrouped aggregate over zero rows still yields one row, with NULL sums
        if dimensions.is_empty() && rows.iter().all(|r| r.total_calls == 0) {
            return Ok(Vec::new());
        }

        Ok(rows)
    }
}

fn dimension_column(dimension: Dimension) -> daily_cost_rollups::Column {
    match dimension {
        Dimension::Date => daily_cost_rollups::Column::Date,
        Dimension::Model => daily_cost_rollups::Column::Model,
        Dimension::UserId => daily_cost_rollups::Column::UserId,
        Dimension::Feature => daily_cost_rollups::Column::Feature,
    }
}

/// `daily_cost_rollups.col + excluded.col`
fn accumulate(column: daily_cost_rollups::Column) -> SimpleExpr {
    Expr::col((daily_cost_rollups::Entity, column)).add(Expr::col((Alias::new("excluded"), column)))
}

/// `COALESCE(CAST(SUM(col) AS BIGINT), 0)`; PostgreSQL widens `SUM(bigint)` to numeric
fn sum(column: daily_cost_rollups::Column) -> SimpleExpr {
    SimpleExpr::from(Func::coalesce([
        SimpleExpr::from(Func::cast_as(
            Func::sum(Expr::col(column)),
            Alias::new("BIGINT"),
        )),
        Expr::value(0i64),
    ]))
}
