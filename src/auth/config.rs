use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// HMAC secret used to hash stored API keys. Changing it invalidates every issued key.
    #[serde(default = "default_api_key_secret")]
    pub secret: String,
}

fn default_api_key_secret() -> String {
    "change-me-api-key-secret".to_string()
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            secret: default_api_key_secret(),
        }
    }
}
