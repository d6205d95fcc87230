pub mod config;
pub mod route_builder;

use crate::{
    auth::ApiKeyValidator,
    config::Config,
    database::{DatabaseManager, DatabaseManagerImpl},
    error::AppError,
    ingestion::IngestionService,
    pricing::PricingTable,
    query::QueryService,
    routes::{create_cost_routes, create_event_routes, create_health_routes},
    server::route_builder::{RouteHelpers, middleware_factories::request_response_logger},
    utils::request_id::request_id_middleware,
};
use axum::{Router, middleware};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Maximum request body size (10MB)
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub database: Arc<dyn DatabaseManager>,
    pub pricing: Arc<PricingTable>,
    pub ingestion: Arc<IngestionService>,
    pub query: Arc<QueryService>,
    pub api_keys: ApiKeyValidator,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let database: Arc<dyn DatabaseManager> = Arc::new(
            DatabaseManagerImpl::new_from_config(&config)
                .await
                .map_err(AppError::Database)?,
        );
        Self::with_database(config, database)
    }

    /// Assemble the services over an existing database handle
    pub fn with_database(
        config: Config,
        database: Arc<dyn DatabaseManager>,
    ) -> Result<Self, AppError> {
        let pricing = Arc::new(PricingTable::load(&config.pricing)?);
        let ingestion = Arc::new(IngestionService::new(
            database.clone(),
            pricing.clone(),
            &config,
        ));
        let query = Arc::new(QueryService::new(database.clone(), &config.query));
        let api_keys = ApiKeyValidator::new(database.clone(), &config.api_keys);

        Ok(Self {
            config: Arc::new(config),
            database,
            pricing,
            ingestion,
            query,
            api_keys,
        })
    }

    pub async fn run(&self) -> Result<(), AppError> {
        if self.config.database.migration_on_startup {
            info!("Running database migrations");
            self.database.migrate().await.map_err(AppError::Database)?;
        }

        let app = self.create_app();

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Server listening on http://{}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            AppError::Internal(format!("Server error: {}", e))
        })?;

        info!("Server shutdown complete");
        Ok(())
    }

    // Creates an application router
    pub fn create_app(&self) -> Router {
        let mut app = Router::new()
            .merge(RouteHelpers::without_auth("/health", create_health_routes()))
            .merge(RouteHelpers::with_body_limit_auth(
                "/v1",
                create_event_routes().merge(create_cost_routes()),
                self,
                MAX_BODY_SIZE,
            ))
            .with_state(self.clone());

        if self.config.logging.log_request {
            app = app.layer(middleware::from_fn(request_response_logger));
        }
        app.layer(middleware::from_fn(request_id_middleware))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Graceful shutdown initiated");
}
