//! Index cleanup
//!
//! Drops every secondary index of a set of collections so the services can
//! recreate them with current definitions on their next start. The `_id_`
//! index is never touched.

use crate::db::DynDocumentStore;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DropStatus {
    /// Would be dropped; nothing was executed
    Planned,
    Dropped,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexDrop {
    pub name: String,
    #[serde(flatten)]
    pub status: DropStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionCleanup {
    pub collection: String,
    /// Set when the indexes could not be listed; the collection was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub indexes: Vec<IndexDrop>,
}

/// Outcome of a cleanup run
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub database: String,
    pub executed: bool,
    pub collections: Vec<CollectionCleanup>,
}

impl CleanupReport {
    pub fn dropped_count(&self) -> usize {
        self.count(|status| matches!(status, DropStatus::Dropped))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|status| matches!(status, DropStatus::Failed { .. }))
    }

    pub fn planned_count(&self) -> usize {
        self.count(|status| matches!(status, DropStatus::Planned))
    }

    fn count(&self, predicate: impl Fn(&DropStatus) -> bool) -> usize {
        self.collections
            .iter()
            .flat_map(|c| &c.indexes)
            .filter(|i| predicate(&i.status))
            .count()
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for collection in &self.collections {
            writeln!(f, "Collection: {}", collection.collection)?;
            if let Some(error) = &collection.error {
                writeln!(f, "  ❌ Failed to list indexes: {}", error)?;
                continue;
            }
            if collection.indexes.is_empty() {
                writeln!(f, "  no secondary indexes")?;
            }
            for index in &collection.indexes {
                match &index.status {
                    DropStatus::Planned => writeln!(f, "  would drop: {}", index.name)?,
                    DropStatus::Dropped => writeln!(f, "  dropped: {}", index.name)?,
                    DropStatus::Failed { message } => {
                        writeln!(f, "  ❌ failed to drop {}: {}", index.name, message)?
                    }
                }
            }
        }
        writeln!(f)?;

        if self.executed {
            write!(
                f,
                "Index cleanup complete on {}: {} dropped, {} failed. Restart the services to recreate the indexes.",
                self.database,
                self.dropped_count(),
                self.failed_count()
            )
        } else {
            write!(
                f,
                "{} indexes would be dropped on {}. Re-run with --yes to drop them.",
                self.planned_count(),
                self.database
            )
        }
    }
}

pub struct IndexCleanupService {
    store: DynDocumentStore,
}

impl IndexCleanupService {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// Drop the secondary indexes of `collections`, or only list them when
    /// `execute` is false.
    ///
    /// Failures are recorded per collection and per index; the run always
    /// goes through every collection.
    pub async fn run(&self, collections: &[String], execute: bool) -> CleanupReport {
        let mut results = Vec::with_capacity(collections.len());

        for name in collections {
            tracing::info!("Processing collection {}", name);
            let indexes = match self.store.list_indexes(name).await {
                Ok(indexes) => indexes,
                Err(e) => {
                    tracing::warn!("Failed to list indexes of {}: {}", name, e);
                    results.push(CollectionCleanup {
                        collection: name.clone(),
                        error: Some(e.to_string()),
                        indexes: Vec::new(),
                    });
                    continue;
                }
            };

            let mut drops = Vec::new();
            for index in indexes.into_iter().filter(|i| !i.is_primary_key()) {
                let status = if !execute {
                    DropStatus::Planned
                } else {
                    match self.store.drop_index(name, &index.name).await {
                        Ok(()) => {
                            tracing::info!("Dropped index {}.{}", name, index.name);
                            DropStatus::Dropped
                        }
                        Err(e) => {
                            tracing::warn!("Failed to drop index {}.{}: {}", name, index.name, e);
                            DropStatus::Failed {
                                message: e.to_string(),
                            }
                        }
                    }
                };
                drops.push(IndexDrop {
                    name: index.name,
                    status,
                });
            }

            results.push(CollectionCleanup {
                collection: name.clone(),
                error: None,
                indexes: drops,
            });
        }

        CleanupReport {
            database: self.store.database_name().to_string(),
            executed: execute,
            collections: results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanupConfig;
    use crate::db::{create_test_store, schema};
    use crate::models::ID_INDEX_NAME;

    async fn setup() -> DynDocumentStore {
        let store: DynDocumentStore = create_test_store();
        schema::ensure_indexes(&store).await;
        store
            .create_index(&crate::models::IndexSpec::ascending("tenants", &["name"]).unique())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_plan_drops_nothing() {
        let store = setup().await;
        let collections = CleanupConfig::default().collections;

        let report = IndexCleanupService::new(store.clone())
            .run(&collections, false)
            .await;

        assert!(!report.executed);
        assert_eq!(report.planned_count(), 2);
        assert_eq!(report.dropped_count(), 0);
        assert_eq!(store.list_indexes("tenants").await.unwrap().len(), 2);
        assert!(report.to_string().contains("Re-run with --yes"));
    }

    #[tokio::test]
    async fn test_drop_keeps_primary_key() {
        let store = setup().await;
        let collections = CleanupConfig::default().collections;

        let report = IndexCleanupService::new(store.clone())
            .run(&collections, true)
            .await;

        assert_eq!(report.dropped_count(), 2);
        assert_eq!(report.failed_count(), 0);
        assert_eq!(report.collections.len(), collections.len());

        for name in ["cloud_iam_users", "tenants"] {
            let indexes = store.list_indexes(name).await.unwrap();
            assert_eq!(indexes.len(), 1);
            assert_eq!(indexes[0].name, ID_INDEX_NAME);
        }

        // Collections outside the cleanup list are untouched
        assert_eq!(store.list_indexes("users").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_collections_are_empty() {
        let report = IndexCleanupService::new(create_test_store())
            .run(&["cloud_audit_logs".to_string()], true)
            .await;

        assert_eq!(report.collections.len(), 1);
        assert!(report.collections[0].error.is_none());
        assert!(report.collections[0].indexes.is_empty());
        assert!(report.to_string().contains("no secondary indexes"));
    }
}
