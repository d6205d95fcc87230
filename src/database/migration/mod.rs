use sea_orm_migration::prelude::*;

pub use sea_orm_migration::MigratorTrait;

mod m20250301_000001_create_customers_table;
mod m20250301_000002_create_api_keys_table;
mod m20250301_000003_create_usage_events_table;
mod m20250301_000004_create_daily_cost_rollups_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_customers_table::Migration),
            Box::new(m20250301_000002_create_api_keys_table::Migration),
            Box::new(m20250301_000003_create_usage_events_table::Migration),
            Box::new(m20250301_000004_create_daily_cost_rollups_table::Migration),
        ]
    }
}

/// Common table and column identifiers
#[derive(Iden)]
pub enum Customers {
    Table,
    Id,
    Email,
    Plan,
    CreatedAt,
}

#[derive(Iden)]
pub enum ApiKeys {
    Table,
    Id,
    CustomerId,
    Name,
    KeyHash,
    KeyPrefix,
    CreatedAt,
    LastUsedAt,
    RevokedAt,
}

#[derive(Iden)]
pub enum UsageEvents {
    Table,
    Id,
    Timestamp,
    CustomerId,
    Model,
    InputTokens,
    OutputTokens,
    InputCostNanos,
    OutputCostNanos,
    TotalCostNanos,
    Priced,
    DurationMs,
    UserId,
    Feature,
    Metadata,
    IngestedAt,
}

#[derive(Iden)]
pub enum DailyCostRollups {
    Table,
    Id,
    CustomerId,
    Date,
    Model,
    UserId,
    Feature,
    TotalCalls,
    TotalInputTokens,
    TotalOutputTokens,
    TotalCostNanos,
    UpdatedAt,
}
