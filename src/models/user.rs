//! Application user model
//!
//! Owned by the user management service; declared here for its unique keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application user stored in `users`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub const COLLECTION: &'static str = "users";

    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            created_at: Utc::now(),
        }
    }
}
