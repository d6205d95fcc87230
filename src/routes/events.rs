use crate::{
    auth::CustomerExtractor,
    error::AppError,
    ingestion::{IngestReceipt, UsageEventInput},
    query::{EventFilter, EventPage, PageRequest},
    server::Server,
};
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event ingestion and raw event reads
pub fn create_event_routes() -> Router<Server> {
    Router::new()
        .route("/events", post(ingest_event).get(list_events))
        .route("/events/batch", post(ingest_batch))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub events: Vec<UsageEventInput>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub accepted: usize,
    pub duplicates: usize,
    pub events: Vec<IngestReceipt>,
}

/// Query parameters for raw event pages
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub user_id: Option<String>,
    pub feature: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u64>,
}

async fn ingest_event(
    State(server): State<Server>,
    CustomerExtractor(auth): CustomerExtractor,
    Json(input): Json<UsageEventInput>,
) -> Result<(StatusCode, Json<IngestReceipt>), AppError> {
    let receipt = server.ingestion.ingest(auth.customer_id, input).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn ingest_batch(
    State(server): State<Server>,
    CustomerExtractor(auth): CustomerExtractor,
    Json(batch): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchResponse>), AppError> {
    let receipts = server
        .ingestion
        .ingest_batch(auth.customer_id, batch.events)
        .await?;

    let duplicates = receipts.iter().filter(|r| r.duplicate).count();
    Ok((
        StatusCode::CREATED,
        Json(BatchResponse {
            accepted: receipts.len() - duplicates,
            duplicates,
            events: receipts,
        }),
    ))
}

async fn list_events(
    State(server): State<Server>,
    CustomerExtractor(auth): CustomerExtractor,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventPage>, AppError> {
    let filter = EventFilter {
        start: params.start,
        end: params.end,
        model: params.model,
        user_id: params.user_id,
        feature: params.feature,
    };
    let page = PageRequest {
        cursor: params.cursor,
        limit: params.limit,
    };

    let page = server
        .query
        .query_events(auth.customer_id, filter, page)
        .await?;
    Ok(Json(page))
}
