use crate::auth::{AuthContext, AuthError};
use crate::auth::config::ApiKeyConfig;
use crate::database::entities::ApiKeyRecord;
use crate::database::{DatabaseError, DatabaseManager};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Prefix of every issued key
pub const API_KEY_PREFIX: &str = "cg_live_";

/// Random alphanumeric characters after the prefix
pub const API_KEY_RANDOM_LEN: usize = 32;

/// Characters of the key stored in clear for lookup
pub const KEY_PREFIX_LEN: usize = 12;

type HmacSha256 = Hmac<Sha256>;

/// Keyed hash for API keys
#[derive(Clone)]
pub struct ApiKeyHasher {
    secret: Vec<u8>,
}

impl ApiKeyHasher {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Hex-encoded HMAC-SHA256 of `api_key`
    pub fn hash(&self, api_key: &str) -> String {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            unreachable!("HMAC accepts keys of any length");
        };
        mac.update(api_key.as_bytes());
        format!("{:x}", mac.finalize().into_bytes())
    }

    /// Constant-time check of `api_key` against a stored hash
    pub fn verify(&self, api_key: &str, stored_hash: &str) -> bool {
        let computed = self.hash(api_key);
        computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
    }
}

/// A freshly issued key. `key` is shown once and never stored.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key: String,
    pub record: ApiKeyRecord,
}

/// Generate a random key: the prefix followed by alphanumeric characters
pub fn generate_api_key() -> String {
    let random_part: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_RANDOM_LEN)
        .map(char::from)
        .collect();

    format!("{}{}", API_KEY_PREFIX, random_part)
}

/// Whether `api_key` has the issued shape
pub fn is_well_formed(api_key: &str) -> bool {
    api_key.strip_prefix(API_KEY_PREFIX).is_some_and(|random| {
        random.len() == API_KEY_RANDOM_LEN && random.chars().all(|c| c.is_ascii_alphanumeric())
    })
}

/// Lookup prefix stored next to the hash
pub fn key_prefix(api_key: &str) -> &str {
    api_key.get(..KEY_PREFIX_LEN).unwrap_or(api_key)
}

/// Resolves presented keys to customers and issues new keys
#[derive(Clone)]
pub struct ApiKeyValidator {
    database: Arc<dyn DatabaseManager>,
    hasher: ApiKeyHasher,
}

impl ApiKeyValidator {
    pub fn new(database: Arc<dyn DatabaseManager>, config: &ApiKeyConfig) -> Self {
        Self {
            database,
            hasher: ApiKeyHasher::new(&config.secret),
        }
    }

    /// Validate a presented key.
    ///
    /// Active keys with the same prefix are checked first; if none matches, a
    /// match among revoked keys yields `RevokedKey`. Rejections write nothing.
    pub async fn validate(&self, presented: &str) -> Result<AuthContext, AuthError> {
        if !is_well_formed(presented) {
            trace!("Rejected malformed API key");
            return Err(AuthError::InvalidKey);
        }

        let prefix = key_prefix(presented);
        let api_keys = self.database.api_keys();

        let active = api_keys
            .find_active_by_prefix(prefix)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;

        if let Some(key) = active
            .iter()
            .find(|key| self.hasher.verify(presented, &key.key_hash))
        {
            if let Err(e) = api_keys.touch_last_used(key.id).await {
                warn!(api_key_id = %key.id, error = %e, "Failed to update API key last_used_at");
            }
            trace!(api_key_id = %key.id, customer_id = %key.customer_id, "API key authentication successful");
            return Ok(AuthContext {
                customer_id: key.customer_id,
                api_key_id: key.id,
            });
        }

        let revoked = api_keys
            .find_revoked_by_prefix(prefix)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;

        if let Some(key) = revoked
            .iter()
            .find(|key| self.hasher.verify(presented, &key.key_hash))
        {
            warn!(api_key_id = %key.id, customer_id = %key.customer_id, "Revoked API key presented");
            return Err(AuthError::RevokedKey);
        }

        debug!(key_prefix = %prefix, "Unknown API key presented");
        Err(AuthError::InvalidKey)
    }

    /// Issue a new key for a customer. Only the hash and prefix are persisted.
    pub async fn issue(&self, customer_id: Uuid, name: &str) -> Result<IssuedApiKey, DatabaseError> {
        let key = generate_api_key();
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            customer_id,
            name: name.to_string(),
            key_hash: self.hasher.hash(&key),
            key_prefix: key_prefix(&key).to_string(),
            created_at: Utc::now(),
            last_used_at: None,
            revoked_at: None,
        };

        self.database.api_keys().store(&record).await?;
        debug!(api_key_id = %record.id, customer_id = %customer_id, "Issued API key");

        Ok(IssuedApiKey { key, record })
    }
}
