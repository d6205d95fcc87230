use super::{Customers, DailyCostRollups};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DailyCostRollups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DailyCostRollups::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DailyCostRollups::CustomerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DailyCostRollups::Date).date().not_null())
                    .col(ColumnDef::new(DailyCostRollups::Model).string().not_null())
                    .col(
                        ColumnDef::new(DailyCostRollups::UserId)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DailyCostRollups::Feature)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DailyCostRollups::TotalCalls)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyCostRollups::TotalInputTokens)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyCostRollups::TotalOutputTokens)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyCostRollups::TotalCostNanos)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyCostRollups::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_daily_cost_rollups_customer_id")
                            .from(DailyCostRollups::Table, DailyCostRollups::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Conflict target of the increment upsert
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_daily_cost_rollups_key")
                    .table(DailyCostRollups::Table)
                    .col(DailyCostRollups::CustomerId)
                    .col(DailyCostRollups::Date)
                    .col(DailyCostRollups::Model)
                    .col(DailyCostRollups::UserId)
                    .col(DailyCostRollups::Feature)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DailyCostRollups::Table).to_owned())
            .await
    }
}
