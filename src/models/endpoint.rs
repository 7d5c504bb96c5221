//! API endpoint model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered API endpoint stored in `endpoints`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint name (unique)
    pub name: String,
    pub url: String,
    /// HTTP method
    pub method: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    pub const COLLECTION: &'static str = "endpoints";

    pub fn new(name: impl Into<String>, url: impl Into<String>, method: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            url: url.into(),
            method: method.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
