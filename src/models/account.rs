//! Service account model

use serde::Serialize;

use crate::config::AccountConfig;

/// Database-scoped login the application connects with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceAccount {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Built-in role granted on the account's own database
    pub role: String,
}

impl From<&AccountConfig> for ServiceAccount {
    fn from(config: &AccountConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            role: config.role.clone(),
        }
    }
}

/// Result of ensuring the service account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountOutcome {
    pub username: String,
    pub database: String,
    pub role: String,
    /// `false` when the account already existed
    pub created: bool,
}
