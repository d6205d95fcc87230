pub mod api_key;
pub mod config;
pub mod middleware;

pub use api_key::{ApiKeyHasher, ApiKeyValidator, IssuedApiKey};
pub use middleware::{CustomerExtractor, api_key_middleware};

use thiserror::Error;
use uuid::Uuid;

/// Caller identity resolved from a valid API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub customer_id: Uuid,
    pub api_key_id: Uuid,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid API key")]
    InvalidKey,
    #[error("API key has been revoked")]
    RevokedKey,
    #[error("Database error: {0}")]
    Database(String),
}
