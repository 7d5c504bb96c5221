//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Login session stored in `sessions`, removed by the TTL index on `expires_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (unique)
    pub session_id: String,
    /// Associated user ID
    pub user_id: String,
    /// Expiration timestamp
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub const COLLECTION: &'static str = "sessions";

    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            expires_at: Utc::now() + ttl,
        }
    }

    /// Check if the session has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
