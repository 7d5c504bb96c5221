//! Schema bootstrap service
//!
//! Ensures the service account, the declared collections and the declared
//! indexes, in that order. Account and collection failures abort the run;
//! index failures are recorded in the report and the run goes on.

use crate::db::{schema, DynDocumentStore};
use crate::models::{AccountOutcome, CollectionOutcome, EnsureStatus, IndexOutcome, ServiceAccount};
use crate::services::account::AccountService;
use anyhow::Result;
use serde::Serialize;
use std::fmt;

/// Outcome of an `ensure-schema` run
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub database: String,
    pub account: AccountOutcome,
    pub collections: Vec<CollectionOutcome>,
    pub indexes: Vec<IndexOutcome>,
}

impl SchemaReport {
    /// Indexes created or already present, conflicts included
    pub fn ensured_count(&self) -> usize {
        self.indexes.iter().filter(|o| !o.is_failed()).count()
    }

    pub fn conflict_count(&self) -> usize {
        self.indexes.iter().filter(|o| o.is_conflict()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.indexes.iter().filter(|o| o.is_failed()).count()
    }
}

impl fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.indexes {
            match &outcome.status {
                EnsureStatus::Ensured => {}
                EnsureStatus::Conflict { .. } => writeln!(
                    f,
                    "ℹ️  {}.{} already exists with different options, skipped",
                    outcome.collection, outcome.name
                )?,
                EnsureStatus::Failed { message } => writeln!(
                    f,
                    "❌ {}.{} could not be created: {}",
                    outcome.collection, outcome.name, message
                )?,
            }
        }

        let collections: Vec<&str> = self.collections.iter().map(|c| c.name.as_str()).collect();
        writeln!(f, "✅ Schema initialization complete")?;
        writeln!(f, "Database: {}", self.database)?;
        writeln!(
            f,
            "Account: {} ({}, {})",
            self.account.username,
            self.account.role,
            if self.account.created { "created" } else { "already present" }
        )?;
        writeln!(f, "Collections: {}", collections.join(", "))?;
        write!(
            f,
            "Indexes: {} ensured ({} kept with different options), {} failed",
            self.ensured_count(),
            self.conflict_count(),
            self.failed_count()
        )
    }
}

/// Declared schema items absent from the database
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub database: String,
    pub missing_collections: Vec<String>,
    /// `collection.index` names
    pub missing_indexes: Vec<String>,
}

impl StatusReport {
    pub fn is_up_to_date(&self) -> bool {
        self.missing_collections.is_empty() && self.missing_indexes.is_empty()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_up_to_date() {
            return write!(f, "✅ {} has every declared collection and index", self.database);
        }

        writeln!(f, "⚠️  {} is missing part of the declared schema", self.database)?;
        for name in &self.missing_collections {
            writeln!(f, "  collection: {}", name)?;
        }
        for name in &self.missing_indexes {
            writeln!(f, "  index: {}", name)?;
        }
        write!(f, "Run `ensure-schema` to create them.")
    }
}

pub struct SchemaService {
    store: DynDocumentStore,
}

impl SchemaService {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// Ensure account, collections and indexes
    pub async fn ensure_schema(&self, account: &ServiceAccount) -> Result<SchemaReport> {
        let account = AccountService::new(self.store.clone())
            .ensure(account)
            .await?;
        let collections = schema::ensure_collections(&self.store).await?;
        let indexes = schema::ensure_indexes(&self.store).await;

        Ok(SchemaReport {
            database: self.store.database_name().to_string(),
            account,
            collections,
            indexes,
        })
    }

    /// List what `ensure_schema` would still create
    pub async fn status(&self) -> Result<StatusReport> {
        let missing_collections = schema::missing_collections(&self.store).await?;
        let missing_indexes = schema::missing_indexes(&self.store)
            .await?
            .into_iter()
            .map(|spec| format!("{}.{}", spec.collection, spec.index_name()))
            .collect();

        Ok(StatusReport {
            database: self.store.database_name().to_string(),
            missing_collections,
            missing_indexes,
        })
    }
}
