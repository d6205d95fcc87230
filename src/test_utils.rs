use crate::{
    auth::IssuedApiKey,
    config::Config,
    database::entities::CustomerRecord,
    ingestion::{IngestReceipt, UsageEventInput},
    pricing::UnknownModelPolicy,
    server::Server,
};
use std::path::Path;
use uuid::Uuid;

/// Test server builder over an in-memory SQLite database
pub struct TestServerBuilder {
    config: Config,
    use_memory_db: bool,
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServerBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.api_keys.secret = "test-api-key-secret".to_string();
        config.logging.log_request = false;
        Self {
            config,
            use_memory_db: true,
        }
    }

    /// Use the configured database URL instead of in-memory SQLite
    pub fn with_real_database(mut self) -> Self {
        self.use_memory_db = false;
        self
    }

    /// Use a SQLite file with a real connection pool, so transactions can overlap
    pub fn with_sqlite_file(mut self, path: &Path, max_connections: u32) -> Self {
        self.config.database.url = format!("sqlite://{}?mode=rwc", path.display());
        self.config.database.max_connections = max_connections;
        self.use_memory_db = false;
        self
    }

    /// Set a custom configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_unknown_model_policy(mut self, policy: UnknownModelPolicy) -> Self {
        self.config.pricing.unknown_model_policy = policy;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.config.ingestion.max_batch_size = max_batch_size;
        self
    }

    /// Build the server and run migrations
    pub async fn build(self) -> Server {
        let mut config = self.config;

        if self.use_memory_db {
            config.database.url = "sqlite::memory:".to_string();
        }

        let server = Server::new(config).await.unwrap();
        server.database.migrate().await.unwrap();
        server
    }
}

impl Server {
    pub async fn create_test_customer(&self, email: &str) -> CustomerRecord {
        self.database
            .customers()
            .create(email, "starter")
            .await
            .unwrap()
    }

    pub async fn issue_test_key(&self, customer_id: Uuid) -> IssuedApiKey {
        self.api_keys.issue(customer_id, "test key").await.unwrap()
    }

    /// A customer with one fresh API key
    pub async fn create_test_customer_with_key(&self, email: &str) -> (CustomerRecord, String) {
        let customer = self.create_test_customer(email).await;
        let issued = self.issue_test_key(customer.id).await;
        (customer, issued.key)
    }

    pub async fn ingest_test_event(
        &self,
        customer_id: Uuid,
        input: UsageEventInput,
    ) -> IngestReceipt {
        self.ingestion.ingest(customer_id, input).await.unwrap()
    }
}
