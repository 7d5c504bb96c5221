//! Group membership diagnostics
//!
//! Read-only report on the `cloud_iam_users` group lookup: which indexes
//! exist, how the engine executes the lookup, and a sample of the members
//! it finds. Any failure aborts the report.

use crate::config::DiagnosticsConfig;
use crate::db::schema::GROUP_MEMBERS_INDEX;
use crate::db::DynDocumentStore;
use crate::models::{CloudIamUser, ExecutionStats, IndexInfo, QueryPlan};
use anyhow::{Context, Result};
use mongodb::bson::{doc, from_document, Document};
use serde::Serialize;
use std::fmt;

const SEPARATOR: &str = "------------------------------------------";
const BANNER: &str = "========================================";

/// Result of the group members diagnostic
#[derive(Debug, Clone, Serialize)]
pub struct GroupMembersReport {
    pub collection: String,
    pub group_id: i64,
    pub tenant_id: String,
    /// Indexes whose key includes `permission_groups`
    pub group_indexes: Vec<IndexInfo>,
    /// Every index of the collection
    pub indexes: Vec<IndexInfo>,
    pub total_documents: u64,
    pub stats: ExecutionStats,
    pub sample_limit: i64,
    pub members: Vec<CloudIamUser>,
}

impl GroupMembersReport {
    /// Check if the lookup is served by the dedicated compound index
    pub fn uses_group_index(&self) -> bool {
        self.stats.uses_index(GROUP_MEMBERS_INDEX)
    }
}

impl fmt::Display for GroupMembersReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", BANNER)?;
        writeln!(f, "Group member lookup diagnostics")?;
        writeln!(f, "{}", BANNER)?;
        writeln!(f)?;

        writeln!(f, "1. Indexes on permission_groups")?;
        writeln!(f, "{}", SEPARATOR)?;
        if self.group_indexes.is_empty() {
            writeln!(f, "⚠️  No permission_groups index found")?;
        }
        for index in &self.group_indexes {
            writeln!(f, "✅ Found permission_groups index: {}", index.name)?;
            writeln!(f, "   Key: {}", index.key_json())?;
        }
        writeln!(f)?;

        writeln!(f, "2. Indexes of {}", self.collection)?;
        writeln!(f, "{}", SEPARATOR)?;
        for index in &self.indexes {
            writeln!(f, "Index name: {}", index.name)?;
            writeln!(f, "  Key: {}", index.key_json())?;
            if let Some(background) = index.background {
                writeln!(f, "  Background build: {}", background)?;
            }
        }
        writeln!(f)?;

        writeln!(f, "3. Query performance")?;
        writeln!(f, "{}", SEPARATOR)?;
        writeln!(f, "Total documents: {}", self.total_documents)?;
        writeln!(
            f,
            "Query: permission_groups = {}, tenant_id = {}",
            self.group_id, self.tenant_id
        )?;
        writeln!(f, "Execution time: {} ms", self.stats.execution_time_millis)?;
        writeln!(f, "Documents examined: {}", self.stats.total_docs_examined)?;
        writeln!(f, "Documents returned: {}", self.stats.n_returned)?;
        match &self.stats.plan {
            QueryPlan::IndexScan { index_name } => writeln!(f, "✅ Index used: {}", index_name)?,
            QueryPlan::CollectionScan => writeln!(f, "⚠️  No index used (collection scan)")?,
            QueryPlan::Other { stage } if stage.is_empty() => {
                writeln!(f, "ℹ️  Plan stage not reported")?
            }
            QueryPlan::Other { stage } => writeln!(f, "ℹ️  Plan root stage: {}", stage)?,
        }
        writeln!(f)?;

        writeln!(f, "4. Sample members")?;
        writeln!(f, "{}", SEPARATOR)?;
        writeln!(
            f,
            "Found {} members (showing at most {}):",
            self.members.len(),
            self.sample_limit
        )?;
        for (i, member) in self.members.iter().enumerate() {
            writeln!(f, "  {}. {} (ID: {})", i + 1, member.username, member.id)?;
            writeln!(f, "     Groups: [{}]", member.groups_display())?;
        }
        writeln!(f)?;

        writeln!(f, "{}", BANNER)?;
        writeln!(f, "Diagnostics complete")?;
        write!(f, "{}", BANNER)
    }
}

/// Runs the group members diagnostic against `cloud_iam_users`
pub struct GroupMembersReporter {
    store: DynDocumentStore,
}

impl GroupMembersReporter {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// Lookup filter for one group within one tenant
    pub fn filter(config: &DiagnosticsConfig) -> Document {
        doc! {
            "permission_groups": config.group_id,
            "tenant_id": config.tenant_id.as_str(),
        }
    }

    pub async fn run(&self, config: &DiagnosticsConfig) -> Result<GroupMembersReport> {
        let collection = CloudIamUser::COLLECTION;

        let indexes = self
            .store
            .list_indexes(collection)
            .await
            .with_context(|| format!("Failed to list indexes of {}", collection))?;
        let group_indexes: Vec<IndexInfo> = indexes
            .iter()
            .filter(|index| index.covers_field("permission_groups"))
            .cloned()
            .collect();
        if group_indexes.is_empty() {
            tracing::warn!("No index on {}.permission_groups", collection);
        }

        let total_documents = self
            .store
            .count_documents(collection, Document::new())
            .await
            .with_context(|| format!("Failed to count documents in {}", collection))?;

        let explain = self
            .store
            .explain_find(collection, Self::filter(config))
            .await
            .context("Failed to explain the group member query")?;
        let stats = ExecutionStats::from_explain(&explain)
            .context("Unexpected explain output")?;
        tracing::debug!(plan = ?stats.plan, "Explained group member query");

        let documents = self
            .store
            .find(collection, Self::filter(config), config.sample_limit)
            .await
            .context("Failed to query group members")?;
        let members = documents
            .into_iter()
            .map(from_document::<CloudIamUser>)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to decode a group member")?;

        Ok(GroupMembersReport {
            collection: collection.to_string(),
            group_id: config.group_id,
            tenant_id: config.tenant_id.clone(),
            group_indexes,
            indexes,
            total_documents,
            stats,
            sample_limit: config.sample_limit,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_store, schema, MemoryStore};
    use std::sync::Arc;

    fn seed(store: &MemoryStore) {
        let users = [
            (1_i64, "alice", vec![1_i64, 2], "tenant-001"),
            (2, "bob", vec![1], "tenant-001"),
            (3, "carol", vec![2], "tenant-001"),
            (4, "dave", vec![1], "tenant-002"),
        ];
        for (id, username, groups, tenant) in users {
            let user = CloudIamUser {
                id,
                username: username.to_string(),
                permission_groups: groups,
                tenant_id: tenant.to_string(),
                provider: "aliyun".to_string(),
                ..Default::default()
            };
            store.insert_model(CloudIamUser::COLLECTION, &user).unwrap();
        }
    }

    async fn indexed_store() -> Arc<MemoryStore> {
        let store = create_test_store();
        let dyn_store: DynDocumentStore = store.clone();
        schema::ensure_indexes(&dyn_store).await;
        seed(&store);
        store
    }

    #[tokio::test]
    async fn test_report_uses_compound_index() {
        let store = indexed_store().await;
        let report = GroupMembersReporter::new(store)
            .run(&DiagnosticsConfig::default())
            .await
            .unwrap();

        assert!(report.uses_group_index());
        assert_eq!(report.total_documents, 4);
        assert_eq!(report.stats.n_returned, 2);
        assert_eq!(report.stats.total_docs_examined, 2);
        assert_eq!(report.group_indexes.len(), 1);
        assert_eq!(report.indexes.len(), 2);

        let names: Vec<&str> = report.members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);

        let text = report.to_string();
        assert!(text.contains("✅ Index used: idx_permission_groups_tenant"));
        assert!(text.contains("  1. alice (ID: 1)"));
        assert!(text.contains("     Groups: [1, 2]"));
        assert!(text.contains("  Background build: true"));
    }

    #[tokio::test]
    async fn test_report_without_index_is_collection_scan() {
        let store = create_test_store();
        seed(&store);

        let report = GroupMembersReporter::new(store)
            .run(&DiagnosticsConfig::default())
            .await
            .unwrap();

        assert!(!report.uses_group_index());
        assert_eq!(report.stats.plan, QueryPlan::CollectionScan);
        assert_eq!(report.stats.total_docs_examined, 4);
        assert!(report.group_indexes.is_empty());

        let text = report.to_string();
        assert!(text.contains("⚠️  No permission_groups index found"));
        assert!(text.contains("collection scan"));
    }

    #[tokio::test]
    async fn test_sample_limit() {
        let store = indexed_store().await;
        let config = DiagnosticsConfig {
            sample_limit: 1,
            ..Default::default()
        };

        let report = GroupMembersReporter::new(store).run(&config).await.unwrap();
        assert_eq!(report.members.len(), 1);
        assert_eq!(report.stats.n_returned, 2);
    }

    #[tokio::test]
    async fn test_report_on_empty_database() {
        let report = GroupMembersReporter::new(create_test_store())
            .run(&DiagnosticsConfig::default())
            .await
            .unwrap();

        assert_eq!(report.total_documents, 0);
        assert!(report.members.is_empty());
        assert!(report.indexes.is_empty());
    }

    #[tokio::test]
    async fn test_report_is_read_only() {
        let store = create_test_store();
        seed(&store);
        let dyn_store: DynDocumentStore = store.clone();

        GroupMembersReporter::new(dyn_store.clone())
            .run(&DiagnosticsConfig::default())
            .await
            .unwrap();

        let indexes = dyn_store.list_indexes(CloudIamUser::COLLECTION).await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(store.len(CloudIamUser::COLLECTION), 4);
    }

    #[tokio::test]
    #[ignore = "Requires MongoDB server"]
    async fn test_report_on_mongodb() {
        use crate::config::DatabaseConfig;
        use crate::db::create_store;

        let config = DatabaseConfig {
            url: std::env::var("ECAM_TEST_MONGODB_URL")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            name: "ecam_schema_test_report".to_string(),
            ..Default::default()
        };
        let store = create_store(&config).await.expect("Failed to connect");
        schema::ensure_indexes(&store).await;

        let report = GroupMembersReporter::new(store)
            .run(&DiagnosticsConfig::default())
            .await
            .unwrap();
        assert!(report.group_indexes.iter().any(|i| i.name == GROUP_MEMBERS_INDEX));
    }
}
