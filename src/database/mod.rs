//! Database access layer with domain-specific DAOs
//!
//! Each table has its own DAO. Ingestion writes go through
//! [`crate::ingestion::IngestionService`], which runs the event append and the
//! rollup increment inside one transaction.

use crate::config::Config;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, DatabaseConnection};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub mod config;
pub mod dao;
pub mod entities;
pub mod migration;

pub use dao::{
    AppendOutcome, ApiKeysDao, CustomersDao, EventQuery, EventsDao, GroupedTotals, RollupsDao,
    StoreError,
};

/// Database error types
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Record not found")]
    NotFound,
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Migration error: {0}")]
    Migration(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl From<sea_orm::DbErr> for DatabaseError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err.sql_err() {
            Some(sql_err) => DatabaseError::Constraint(sql_err.to_string()),
            None => DatabaseError::Database(err.to_string()),
        }
    }
}

/// Database manager trait for dependency injection and testing
#[async_trait]
pub trait DatabaseManager: Send + Sync {
    /// Run database migrations
    async fn migrate(&self) -> DatabaseResult<()>;

    /// Health check for database connection
    async fn health_check(&self) -> DatabaseResult<()>;

    /// Get customers DAO
    fn customers(&self) -> CustomersDao;

    /// Get API keys DAO
    fn api_keys(&self) -> ApiKeysDao;

    /// Get usage events DAO (read side; appends go through ingestion)
    fn events(&self) -> EventsDao;

    /// Get daily rollups DAO (read side; increments go through ingestion)
    fn rollups(&self) -> RollupsDao;

    /// Get direct database connection (for transactions, migrations and admin operations)
    fn connection(&self) -> &DatabaseConnection;
}

/// Database connection manager implementation
pub struct DatabaseManagerImpl {
    pub connection: DatabaseConnection,
}

impl DatabaseManagerImpl {
    /// Create database manager from configuration
    pub async fn new_from_config(config: &Config) -> Result<Self, DatabaseError> {
        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        // Every pooled connection to an in-memory SQLite URL opens its own empty database
        if config.database.url.contains(":memory:") {
            options.max_connections(1).min_connections(1);
        }

        let connection = sea_orm::Database::connect(options)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        info!(
            backend = ?connection.get_database_backend(),
            "Database connection established"
        );

        Ok(Self { connection })
    }
}

#[async_trait]
impl DatabaseManager for DatabaseManagerImpl {
    async fn migrate(&self) -> DatabaseResult<()> {
        use crate::database::migration::Migrator;
        use sea_orm_migration::MigratorTrait;

        info!("Running database migrations");

        Migrator::up(&self.connection, None)
            .await
            .map_err(|e| DatabaseError::Migration(format!("Failed to run migrations: {}", e)))?;

        info!("Successfully completed all migrations");
        Ok(())
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        self.connection
            .ping()
            .await
            .map_err(|e| DatabaseError::Database(format!("db error: {}", e)))
    }

    fn customers(&self) -> CustomersDao {
        CustomersDao::new(self.connection.clone())
    }

    fn api_keys(&self) -> ApiKeysDao {
        ApiKeysDao::new(self.connection.clone())
    }

    fn events(&self) -> EventsDao {
        EventsDao::new(self.connection.clone())
    }

    fn rollups(&self) -> RollupsDao {
        RollupsDao::new(self.connection.clone())
    }

    fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}
