use crate::{
    aggregation::Dimension,
    auth::CustomerExtractor,
    error::AppError,
    query::{CostSummary, DateRange, DimensionCost, RollupRow},
    server::Server,
};
use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const DEFAULT_DAYS: u32 = 30;

/// Rollup-backed cost reporting
pub fn create_cost_routes() -> Router<Server> {
    Router::new()
        .route("/costs/rollups", get(get_rollups))
        .route("/costs/summary", get(get_summary))
        .route("/costs/by-model", get(get_costs_by_model))
        .route("/costs/by-user", get(get_costs_by_user))
        .route("/costs/by-feature", get(get_costs_by_feature))
}

/// Query parameters for grouped rollups
#[derive(Debug, Default, Deserialize)]
pub struct RollupsQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Comma-separated dimensions, e.g. `model,user_id`
    pub group_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RollupsResponse {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub group_by: Vec<Dimension>,
    pub rows: Vec<RollupRow>,
}

#[derive(Debug, Serialize)]
pub struct BreakdownResponse {
    pub days: u32,
    pub dimension: Dimension,
    pub items: Vec<DimensionCost>,
}

async fn get_rollups(
    State(server): State<Server>,
    CustomerExtractor(auth): CustomerExtractor,
    Query(params): Query<RollupsQuery>,
) -> Result<Json<RollupsResponse>, AppError> {
    let group_by = match params.group_by.as_deref() {
        Some(raw) => Dimension::parse_list(raw).map_err(AppError::BadRequest)?,
        None => Vec::new(),
    };

    let default_range = server.query.default_range();
    let range = match (params.start, params.end) {
        (None, None) => default_range,
        (Some(start), None) => DateRange::new(start, default_range.end),
        (start, Some(end)) => {
            let span = default_range.days() - 1;
            DateRange::new(start.unwrap_or(end - chrono::Duration::days(span)), end)
        }
    };

    let rows = server
        .query
        .query_rollups(auth.customer_id, range, &group_by)
        .await?;

    Ok(Json(RollupsResponse {
        start: range.start,
        end: range.end,
        group_by,
        rows,
    }))
}

async fn get_summary(
    State(server): State<Server>,
    CustomerExtractor(auth): CustomerExtractor,
    Query(params): Query<DaysQuery>,
) -> Result<Json<CostSummary>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_DAYS);
    let summary = server.query.summary(auth.customer_id, days).await?;
    Ok(Json(summary))
}

async fn get_costs_by_model(
    state: State<Server>,
    customer: CustomerExtractor,
    params: Query<DaysQuery>,
) -> Result<Json<BreakdownResponse>, AppError> {
    breakdown(state, customer, params, Dimension::Model).await
}

async fn get_costs_by_user(
    state: State<Server>,
    customer: CustomerExtractor,
    params: Query<DaysQuery>,
) -> Result<Json<BreakdownResponse>, AppError> {
    breakdown(state, customer, params, Dimension::UserId).await
}

async fn get_costs_by_feature(
    state: State<Server>,
    customer: CustomerExtractor,
    params: Query<DaysQuery>,
) -> Result<Json<BreakdownResponse>, AppError> {
    breakdown(state, customer, params, Dimension::Feature).await
}

async fn breakdown(
    State(server): State<Server>,
    CustomerExtractor(auth): CustomerExtractor,
    Query(params): Query<DaysQuery>,
    dimension: Dimension,
) -> Result<Json<BreakdownResponse>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_DAYS);
    let items = server
        .query
        .cost_by(auth.customer_id, dimension, days)
        .await?;

    Ok(Json(BreakdownResponse {
        days,
        dimension,
        items,
    }))
}
