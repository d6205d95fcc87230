//! Event ingestion: pricing, append and rollup increment as one unit
//!
//! Every accepted event is priced, appended to `usage_events` and added to its
//! daily rollup inside a single database transaction. A duplicate
//! `(id, timestamp)` is acknowledged without touching the rollup.

pub mod config;
mod types;

pub use types::{IngestReceipt, UsageEventInput};

use crate::aggregation::{RollupDelta, RollupKey};
use crate::config::Config;
use crate::database::entities::NewUsageEvent;
use crate::database::{AppendOutcome, DatabaseManager, EventsDao, RollupsDao, StoreError};
use crate::pricing::{CostBreakdown, PricingError, PricingTable, UnknownModelPolicy};
use chrono::{DateTime, SubsecRound, Utc};
use sea_orm::{ConnectionTrait, TransactionTrait};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("Invalid event: {0}")]
    Validation(String),
    #[error("Inconsistent cost: {0}")]
    InconsistentCost(String),
    #[error("Unknown customer: {0}")]
    UnknownCustomer(Uuid),
    #[error("Failed to update cost rollup: {0}")]
    AggregationFailure(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Event {index} rejected: {source}")]
    InBatch {
        index: usize,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// The underlying error of a batch item, or `self`
    pub fn root(&self) -> &IngestError {
        match self {
            IngestError::InBatch { source, .. } => source.root(),
            other => other,
        }
    }

    fn at_index(self, index: usize) -> Self {
        IngestError::InBatch {
            index,
            source: Box::new(self),
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownCustomer(id) => IngestError::UnknownCustomer(id),
            StoreError::Validation(msg) => IngestError::Validation(msg),
            err @ StoreError::InconsistentCost { .. } => {
                IngestError::InconsistentCost(err.to_string())
            }
            StoreError::Database(e) => IngestError::Database(e.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for IngestError {
    fn from(err: sea_orm::DbErr) -> Self {
        IngestError::Database(err.to_string())
    }
}

/// Single write path for usage events and their rollups
pub struct IngestionService {
    database: Arc<dyn DatabaseManager>,
    pricing: Arc<PricingTable>,
    unknown_model_policy: UnknownModelPolicy,
    max_batch_size: usize,
}

impl IngestionService {
    pub fn new(
        database: Arc<dyn DatabaseManager>,
        pricing: Arc<PricingTable>,
        config: &Config,
    ) -> Self {
        Self {
            database,
            pricing,
            unknown_model_policy: config.pricing.unknown_model_policy,
            max_batch_size: config.ingestion.max_batch_size,
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Price and store one event for `customer_id`
    pub async fn ingest(
        &self,
        customer_id: Uuid,
        input: UsageEventInput,
    ) -> Result<IngestReceipt, IngestError> {
        let event = self.prepare(customer_id, input, Utc::now())?;

        let txn = self.database.connection().begin().await?;
        let outcome = write_event(&txn, &event).await?;
        txn.commit().await?;

        log_outcome(&event, outcome);
        Ok(receipt(&event, outcome))
    }

    /// Store a batch atomically: either every event is stored or none is.
    /// The error of the first failing event carries its position in the batch.
    pub async fn ingest_batch(
        &self,
        customer_id: Uuid,
        inputs: Vec<UsageEventInput>,
    ) -> Result<Vec<IngestReceipt>, IngestError> {
        if inputs.is_empty() {
            return Err(IngestError::Validation("batch is empty".to_string()));
        }
        if inputs.len() > self.max_batch_size {
            return Err(IngestError::Validation(format!(
                "batch of {} events exceeds the limit of {}",
                inputs.len(),
                self.max_batch_size
            )));
        }

        let now = Utc::now();
        let events = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                self.prepare(customer_id, input, now)
                    .map_err(|e| e.at_index(index))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let txn = self.database.connection().begin().await?;
        let mut outcomes = Vec::with_capacity(events.len());
        for (index, event) in events.iter().enumerate() {
            let outcome = write_event(&txn, event)
                .await
                .map_err(|e| e.at_index(index))?;
            outcomes.push(outcome);
        }
        txn.commit().await?;

        let duplicates = outcomes
            .iter()
            .filter(|o| **o == AppendOutcome::Duplicate)
            .count();
        info!(
            customer_id = %customer_id,
            events = events.len(),
            duplicates,
            "Ingested event batch"
        );

        Ok(events
            .iter()
            .zip(outcomes)
            .map(|(event, outcome)| receipt(event, outcome))
            .collect())
    }

    /// Validate and price an input. Nothing touches the database here.
    fn prepare(
        &self,
        customer_id: Uuid,
        input: UsageEventInput,
        now: DateTime<Utc>,
    ) -> Result<NewUsageEvent, IngestError> {
        let model = input.model.trim().to_string();
        if model.is_empty() {
            return Err(IngestError::Validation("model is required".to_string()));
        }
        if input.input_tokens < 0 || input.output_tokens < 0 {
            return Err(IngestError::Validation(
                "input_tokens and output_tokens must not be negative".to_string(),
            ));
        }

        let (cost, priced) = match self
            .pricing
            .compute_cost(&model, input.input_tokens, input.output_tokens)
        {
            Ok(cost) => (cost, true),
            Err(PricingError::UnknownModel(name))
                if self.unknown_model_policy == UnknownModelPolicy::RecordUnpriced =>
            {
                warn!(model = %name, "Recording event for unpriced model");
                (CostBreakdown::zero(), false)
            }
            Err(PricingError::UnknownModel(name)) => return Err(IngestError::UnknownModel(name)),
            Err(e) => return Err(IngestError::Validation(e.to_string())),
        };

        Ok(NewUsageEvent {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            customer_id,
            // Stored precision is microseconds on every backend; truncating here keeps
            // a retried (id, timestamp) pair byte-identical
            timestamp: input.timestamp.unwrap_or(now).trunc_subsecs(6),
            model,
            input_tokens: input.input_tokens,
            output_tokens: input.output_tokens,
            cost,
            priced,
            duration_ms: input.duration_ms,
            user_id: non_empty(input.user_id),
            feature: non_empty(input.feature),
            metadata: input
                .metadata
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        })
    }
}

/// Append the event and, if it was new, add it to its rollup
async fn write_event<C: ConnectionTrait>(
    conn: &C,
    event: &NewUsageEvent,
) -> Result<AppendOutcome, IngestError> {
    let outcome = EventsDao::append(conn, event).await?;
    if outcome == AppendOutcome::Duplicate {
        return Ok(outcome);
    }

    let key = RollupKey::for_event(event);
    let delta = RollupDelta::for_event(event).ok_or_else(|| {
        IngestError::AggregationFailure(format!("cost of event {} out of range", event.id))
    })?;

    RollupsDao::increment(conn, &key, &delta)
        .await
        .map_err(|e| {
            error!(
                event_id = %event.id,
                customer_id = %event.customer_id,
                error = %e,
                "Rollup increment failed, rolling back event"
            );
            IngestError::AggregationFailure(e.to_string())
        })?;

    Ok(outcome)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn receipt(event: &NewUsageEvent, outcome: AppendOutcome) -> IngestReceipt {
    IngestReceipt {
        id: event.id,
        timestamp: event.timestamp,
        input_cost: event.cost.input_cost,
        output_cost: event.cost.output_cost,
        total_cost: event.cost.total_cost,
        priced: event.priced,
        duplicate: outcome == AppendOutcome::Duplicate,
    }
}

fn log_outcome(event: &NewUsageEvent, outcome: AppendOutcome) {
    match outcome {
        AppendOutcome::Inserted => debug!(
            event_id = %event.id,
            customer_id = %event.customer_id,
            model = %event.model,
            total_cost = %event.cost.total_cost,
            "Ingested usage event"
        ),
        AppendOutcome::Duplicate => info!(
            event_id = %event.id,
            customer_id = %event.customer_id,
            "Duplicate usage event acknowledged"
        ),
    }
}
