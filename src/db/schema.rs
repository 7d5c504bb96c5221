//! Declared schema
//!
//! The collections and indexes the e-cam service expects, kept as constant
//! tables so the whole schema is visible in one place and compiled into the
//! binary. There is no version ledger: every run re-ensures the full table.
//!
//! # Usage
//!
//! ```ignore
//! use ecam_schema::db::{create_store, schema};
//!
//! let store = create_store(&config.database).await?;
//! schema::ensure_collections(&store).await?;
//! let outcomes = schema::ensure_indexes(&store).await;
//! ```

use anyhow::{Context, Result};

use super::store::DynDocumentStore;
use crate::models::{
    CloudIamUser, CollectionOutcome, Endpoint, EnsureStatus, IndexInfo, IndexOutcome, IndexSpec,
    Session, User,
};

/// Name of the compound index backing group membership lookups
pub const GROUP_MEMBERS_INDEX: &str = "idx_permission_groups_tenant";

/// Collections created explicitly, in creation order
pub const COLLECTIONS: &[&str] = &[Endpoint::COLLECTION, User::COLLECTION, Session::COLLECTION];

/// All declared indexes, in creation order
pub const INDEXES: &[IndexSpec] = &[
    // Endpoints
    IndexSpec::ascending(Endpoint::COLLECTION, &["name"]).unique(),
    IndexSpec::ascending(Endpoint::COLLECTION, &["url"]),
    IndexSpec::ascending(Endpoint::COLLECTION, &["method"]),
    IndexSpec::ascending(Endpoint::COLLECTION, &["created_at"]),
    IndexSpec::ascending(Endpoint::COLLECTION, &["updated_at"]),
    // Users
    IndexSpec::ascending(User::COLLECTION, &["username"]).unique(),
    IndexSpec::ascending(User::COLLECTION, &["email"]).unique(),
    IndexSpec::ascending(User::COLLECTION, &["created_at"]),
    // Sessions; expired documents are removed as soon as `expires_at` passes
    IndexSpec::ascending(Session::COLLECTION, &["session_id"]).unique(),
    IndexSpec::ascending(Session::COLLECTION, &["user_id"]),
    IndexSpec::ascending(Session::COLLECTION, &["expires_at"]).expire_after(0),
    // Cloud IAM users
    IndexSpec::ascending(CloudIamUser::COLLECTION, &["permission_groups", "tenant_id"])
        .named(GROUP_MEMBERS_INDEX)
        .in_background(),
];

/// Look up a declared index by collection and name
pub fn get_index(collection: &str, name: &str) -> Option<&'static IndexSpec> {
    INDEXES
        .iter()
        .find(|spec| spec.collection == collection && spec.index_name() == name)
}

/// Create every declared collection that does not exist yet.
///
/// Collections are checked against `listCollections` first, so existing ones
/// are left untouched. Any failure aborts.
pub async fn ensure_collections(store: &DynDocumentStore) -> Result<Vec<CollectionOutcome>> {
    let existing = store
        .collection_names()
        .await
        .context("Failed to list collections")?;

    let mut outcomes = Vec::with_capacity(COLLECTIONS.len());
    for name in COLLECTIONS {
        let created = if existing.iter().any(|c| c == name) {
            tracing::debug!("Collection {} already exists", name);
            false
        } else {
            store
                .create_collection(name)
                .await
                .with_context(|| format!("Failed to create collection {}", name))?;
            tracing::info!("Created collection {}", name);
            true
        };
        outcomes.push(CollectionOutcome {
            name: name.to_string(),
            created,
        });
    }

    Ok(outcomes)
}

/// Ensure a single index.
///
/// Never fails: an options conflict leaves the existing index in place and is
/// reported as [`EnsureStatus::Conflict`], any other error as
/// [`EnsureStatus::Failed`].
pub async fn ensure_index(store: &DynDocumentStore, spec: &IndexSpec) -> IndexOutcome {
    let status = match store.create_index(spec).await {
        Ok(name) => {
            tracing::debug!("Ensured index {}.{}", spec.collection, name);
            EnsureStatus::Ensured
        }
        Err(e) if e.is_index_options_conflict() => {
            tracing::info!(
                "Index {}.{} already exists with different options, keeping it",
                spec.collection,
                spec.index_name()
            );
            EnsureStatus::Conflict {
                message: e.to_string(),
            }
        }
        Err(e) => {
            tracing::warn!(
                "Failed to create index {}.{}: {}",
                spec.collection,
                spec.index_name(),
                e
            );
            EnsureStatus::Failed {
                message: e.to_string(),
            }
        }
    };

    IndexOutcome {
        collection: spec.collection.to_string(),
        name: spec.index_name(),
        status,
    }
}

/// Ensure every declared index, continuing past failures
pub async fn ensure_indexes(store: &DynDocumentStore) -> Vec<IndexOutcome> {
    let mut outcomes = Vec::with_capacity(INDEXES.len());
    for spec in INDEXES {
        outcomes.push(ensure_index(store, spec).await);
    }

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    tracing::info!(
        "Ensured {} of {} indexes ({} failed)",
        outcomes.len() - failed,
        outcomes.len(),
        failed
    );
    outcomes
}

/// Declared collections absent from the database
pub async fn missing_collections(store: &DynDocumentStore) -> Result<Vec<String>> {
    let existing = store
        .collection_names()
        .await
        .context("Failed to list collections")?;

    Ok(COLLECTIONS
        .iter()
        .filter(|name| !existing.iter().any(|c| c == *name))
        .map(|name| name.to_string())
        .collect())
}

/// Declared indexes absent from the database, matched by name
pub async fn missing_indexes(store: &DynDocumentStore) -> Result<Vec<&'static IndexSpec>> {
    let mut missing = Vec::new();
    let mut collection: Option<(&str, Vec<IndexInfo>)> = None;

    for spec in INDEXES {
        if collection.as_ref().map(|(name, _)| *name) != Some(spec.collection) {
            let indexes = store
                .list_indexes(spec.collection)
                .await
                .with_context(|| format!("Failed to list indexes of {}", spec.collection))?;
            collection = Some((spec.collection, indexes));
        }

        let name = spec.index_name();
        let present = collection
            .as_ref()
            .map(|(_, indexes)| indexes.iter().any(|index| index.name == name))
            .unwrap_or(false);
        if !present {
            missing.push(spec);
        }
    }

    Ok(missing)
}

/// Check if every declared collection and index exists
pub async fn is_up_to_date(store: &DynDocumentStore) -> Result<bool> {
    Ok(missing_collections(store).await?.is_empty() && missing_indexes(store).await?.is_empty())
}
