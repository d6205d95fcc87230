use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resume point of an event scan.
///
/// Carries the last returned `(timestamp, id)` plus the scan window, so a
/// follow-up request keeps paging the same window even when `now` has moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCursor {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    pub id: Uuid,
    #[serde(rename = "s")]
    pub window_start: DateTime<Utc>,
    #[serde(rename = "e")]
    pub window_end: DateTime<Utc>,
}

impl EventCursor {
    /// Opaque URL-safe token
    pub fn encode(&self) -> String {
        // Serializing plain timestamps and a uuid cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, String> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| format!("cursor is not valid base64: {}", e))?;
        let cursor: Self = serde_json::from_slice(&bytes)
            .map_err(|e| format!("cursor payload is malformed: {}", e))?;

        if cursor.window_start >= cursor.window_end {
            return Err("cursor window is empty".to_string());
        }
        Ok(cursor)
    }
}
