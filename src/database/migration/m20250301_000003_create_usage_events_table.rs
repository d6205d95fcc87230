use super::{Customers, UsageEvents};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use sea_orm_migration::prelude::*;
use tracing::{info, warn};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UsageEvents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(UsageEvents::Id).uuid().not_null())
                    .col(
                        ColumnDef::new(UsageEvents::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UsageEvents::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(UsageEvents::Model).string().not_null())
                    .col(
                        ColumnDef::new(UsageEvents::InputTokens)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::OutputTokens)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::InputCostNanos)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::OutputCostNanos)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::TotalCostNanos)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::Priced)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(UsageEvents::DurationMs).big_integer().null())
                    .col(ColumnDef::new(UsageEvents::UserId).string().null())
                    .col(ColumnDef::new(UsageEvents::Feature).string().null())
                    .col(ColumnDef::new(UsageEvents::Metadata).json_binary().not_null())
                    .col(
                        ColumnDef::new(UsageEvents::IngestedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    // The partition column must be part of every unique key on a hypertable
                    .primary_key(
                        Index::create()
                            .col(UsageEvents::Id)
                            .col(UsageEvents::Timestamp),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usage_events_customer_id")
                            .from(UsageEvents::Table, UsageEvents::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Composite index for customer + time range scans
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_usage_events_customer_time")
                    .table(UsageEvents::Table)
                    .col(UsageEvents::CustomerId)
                    .col(UsageEvents::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_usage_events_customer_model")
                    .table(UsageEvents::Table)
                    .col(UsageEvents::CustomerId)
                    .col(UsageEvents::Model)
                    .to_owned(),
            )
            .await?;

        if manager.get_database_backend() == DatabaseBackend::Postgres {
            create_hypertable_if_available(manager).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UsageEvents::Table).to_owned())
            .await
    }
}

/// Partition `usage_events` by time when the TimescaleDB extension is installed.
/// Plain PostgreSQL keeps an ordinary table.
async fn create_hypertable_if_available(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    let db = manager.get_connection();

    let available = db
        .query_one(Statement::from_string(
            DatabaseBackend::Postgres,
            "SELECT 1 FROM pg_available_extensions WHERE name = 'timescaledb'",
        ))
        .await?
        .is_some();

    if !available {
        warn!("TimescaleDB not available, usage_events stays a regular table");
        return Ok(());
    }

    db.execute_unprepared("CREATE EXTENSION IF NOT EXISTS timescaledb")
        .await?;
    db.execute_unprepared(
        "SELECT create_hypertable('usage_events', 'timestamp', if_not_exists => TRUE, migrate_data => TRUE)",
    )
    .await?;

    info!("usage_events converted to a TimescaleDB hypertable");
    Ok(())
}
