//! Service account provisioning

use crate::db::DynDocumentStore;
use crate::models::{AccountOutcome, ServiceAccount};
use anyhow::{Context, Result};

pub struct AccountService {
    store: DynDocumentStore,
}

impl AccountService {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// Create the account unless it already exists.
    ///
    /// An existing account is left as is; its password and role are not
    /// compared with the configured ones.
    pub async fn ensure(&self, account: &ServiceAccount) -> Result<AccountOutcome> {
        let database = self.store.database_name().to_string();

        let exists = self
            .store
            .account_exists(&account.username)
            .await
            .with_context(|| format!("Failed to look up account {}", account.username))?;

        if exists {
            tracing::info!("Account {} already exists on {}", account.username, database);
        } else {
            self.store
                .create_account(account)
                .await
                .with_context(|| format!("Failed to create account {}", account.username))?;
            tracing::info!(
                "Created account {} with role {} on {}",
                account.username,
                account.role,
                database
            );
        }

        Ok(AccountOutcome {
            username: account.username.clone(),
            database,
            role: account.role.clone(),
            created: !exists,
        })
    }
}
