//! IAM user census
//!
//! Counts the synchronized cloud IAM users, broken down by tenant and by
//! provider, shows the newest records, checks the group collection and
//! runs a few filtered counts.

use crate::db::DynDocumentStore;
use crate::models::{CloudIamGroup, CloudIamUser, FieldCount};
use anyhow::{Context, Result};
use mongodb::bson::{doc, from_document, Document};
use serde::Serialize;
use std::fmt;

/// Number of sample users shown
const SAMPLE_SIZE: i64 = 5;

/// Number of sample groups shown
const GROUP_SAMPLE_SIZE: i64 = 3;

/// Provider used by the filtered counts
const COUNT_PROVIDER: &str = "aliyun";

/// Outcome of one filtered count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryCount {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl fmt::Display for QueryCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.count, &self.error) {
            (_, Some(error)) => write!(f, "❌ {}: query failed - {}", self.label, error),
            (Some(count), None) => write!(f, "✅ {}: {} records", self.label, count),
            (None, None) => write!(f, "ℹ️  {}: not run", self.label),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CensusReport {
    pub database: String,
    pub total: u64,
    pub by_tenant: Vec<FieldCount>,
    pub by_provider: Vec<FieldCount>,
    /// Newest users first, by `ctime`
    pub samples: Vec<CloudIamUser>,
    pub groups_total: u64,
    pub sample_groups: Vec<CloudIamGroup>,
    pub query_counts: Vec<QueryCount>,
}

impl CensusReport {
    fn empty(database: String) -> Self {
        Self {
            database,
            total: 0,
            by_tenant: Vec::new(),
            by_provider: Vec::new(),
            samples: Vec::new(),
            groups_total: 0,
            sample_groups: Vec::new(),
            query_counts: Vec::new(),
        }
    }
}

impl fmt::Display for CensusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== IAM user census ({}) ===", self.database)?;
        writeln!(f, "Total users: {}", self.total)?;

        if self.total == 0 {
            writeln!(f, "⚠️  No user records found")?;
            writeln!(f)?;
            writeln!(f, "Possible causes:")?;
            writeln!(f, "  1. No user sync has run yet")?;
            writeln!(f, "  2. The collection name is wrong")?;
            writeln!(f, "  3. The database name is wrong")?;
            writeln!(f)?;
            write!(
                f,
                "Suggestion: run a group sync, POST /api/v1/cam/iam/groups/sync?cloud_account_id=<id>"
            )?;
            return Ok(());
        }

        writeln!(f)?;
        writeln!(f, "By tenant:")?;
        if self.by_tenant.is_empty() {
            writeln!(f, "  ⚠️  No tenant data")?;
        }
        for (i, bucket) in self.by_tenant.iter().enumerate() {
            writeln!(f, "  {}. tenant {}", i + 1, bucket)?;
        }

        writeln!(f)?;
        writeln!(f, "By provider:")?;
        for (i, bucket) in self.by_provider.iter().enumerate() {
            writeln!(f, "  {}. provider {}", i + 1, bucket)?;
        }

        writeln!(f)?;
        writeln!(f, "Sample users (newest {}):", SAMPLE_SIZE)?;
        for (i, user) in self.samples.iter().enumerate() {
            writeln!(
                f,
                "  {}. ID: {}, username: {}, provider: {}, tenant: {}, groups: [{}]",
                i + 1,
                user.id,
                user.username,
                user.provider,
                user.tenant_id,
                user.groups_display()
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Total groups: {}", self.groups_total)?;
        if !self.sample_groups.is_empty() {
            writeln!(f, "Sample groups (first {}):", GROUP_SAMPLE_SIZE)?;
        }
        for (i, group) in self.sample_groups.iter().enumerate() {
            writeln!(
                f,
                "  {}. ID: {}, name: {}, tenant: {}, members: {}",
                i + 1,
                group.id,
                group.name,
                group.tenant_id,
                group.member_count
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Filtered counts:")?;
        for query in &self.query_counts {
            writeln!(f, "  {}", query)?;
        }
        write!(f, "=== Census complete ===")
    }
}

pub struct UserCensus {
    store: DynDocumentStore,
}

impl UserCensus {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// The filtered counts, labelled for the report
    pub fn count_queries(tenant_id: &str) -> Vec<(String, Document)> {
        vec![
            ("no filter".to_string(), Document::new()),
            (format!("by tenant ({})", tenant_id), doc! { "tenant_id": tenant_id }),
            (
                format!("by provider ({})", COUNT_PROVIDER),
                doc! { "provider": COUNT_PROVIDER },
            ),
            (
                "by tenant and provider".to_string(),
                doc! { "tenant_id": tenant_id, "provider": COUNT_PROVIDER },
            ),
        ]
    }

    /// Count users; everything after the total is skipped when there are none.
    ///
    /// A failed filtered count is recorded in the report and the run continues.
    pub async fn run(&self, tenant_id: &str) -> Result<CensusReport> {
        let collection = CloudIamUser::COLLECTION;
        let database = self.store.database_name().to_string();

        let total = self
            .store
            .count_documents(collection, Document::new())
            .await
            .with_context(|| format!("Failed to count documents in {}", collection))?;

        if total == 0 {
            tracing::warn!("{}.{} holds no users", database, collection);
            return Ok(CensusReport::empty(database));
        }

        let by_tenant = self
            .store
            .count_by_field(collection, "tenant_id")
            .await
            .context("Failed to group users by tenant")?;
        let by_provider = self
            .store
            .count_by_field(collection, "provider")
            .await
            .context("Failed to group users by provider")?;

        let samples = self
            .store
            .find_sorted(
                collection,
                Document::new(),
                Some(doc! { "ctime": -1 }),
                SAMPLE_SIZE,
            )
            .await
            .context("Failed to fetch sample users")?
            .into_iter()
            .map(from_document::<CloudIamUser>)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to decode a sample user")?;

        let groups_total = self
            .store
            .count_documents(CloudIamGroup::COLLECTION, Document::new())
            .await
            .with_context(|| format!("Failed to count documents in {}", CloudIamGroup::COLLECTION))?;
        let sample_groups = if groups_total > 0 {
            self.store
                .find(CloudIamGroup::COLLECTION, Document::new(), GROUP_SAMPLE_SIZE)
                .await
                .context("Failed to fetch sample groups")?
                .into_iter()
                .map(from_document::<CloudIamGroup>)
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to decode a sample group")?
        } else {
            Vec::new()
        };

        let mut query_counts = Vec::new();
        for (label, filter) in Self::count_queries(tenant_id) {
            let outcome = match self.store.count_documents(collection, filter).await {
                Ok(count) => QueryCount {
                    label,
                    count: Some(count),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("Count {} failed: {}", label, e);
                    QueryCount {
                        label,
                        count: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            query_counts.push(outcome);
        }

        Ok(CensusReport {
            database,
            total,
            by_tenant,
            by_provider,
            samples,
            groups_total,
            sample_groups,
            query_counts,
        })
    }
}
