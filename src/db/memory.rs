//! In-memory document store
//!
//! Emulates the part of the server's behavior the schema tool depends on:
//! - collections, with the implicit `_id_` index
//! - index creation, including the options conflict (code 85)
//! - unique keys, checked on insert and when a unique index is built
//! - TTL expiry, run on demand with [`MemoryStore::purge_expired`]
//! - equality filters, where an array field matches any of its elements
//! - explain output shaped like the server's `executionStats` reply
//!
//! Nothing is persisted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use super::store::{DocumentStore, StoreError, NAMESPACE_NOT_FOUND_CODE};
use crate::config::DatabaseDriver;
use crate::models::{FieldCount, IndexInfo, IndexSpec, ServiceAccount, ID_INDEX_NAME};

/// Server code for an index name reused with a different key pattern
const INDEX_KEY_SPECS_CONFLICT_CODE: i32 = 86;
/// Server code for dropping an index that does not exist
const INDEX_NOT_FOUND_CODE: i32 = 27;
/// Server code for creating an account that already exists
const USER_EXISTS_CODE: i32 = 51003;
/// Server code for a collection that already exists
const NAMESPACE_EXISTS_CODE: i32 = 48;

#[derive(Debug)]
struct MemoryCollection {
    indexes: Vec<IndexInfo>,
    documents: Vec<Document>,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            indexes: vec![IndexInfo::primary_key()],
            documents: Vec::new(),
        }
    }

    /// Indexes that reject duplicate keys, the primary key included
    fn unique_indexes(&self) -> impl Iterator<Item = &IndexInfo> {
        self.indexes
            .iter()
            .filter(|index| index.unique || index.is_primary_key())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<String, MemoryCollection>,
    accounts: BTreeMap<String, ServiceAccount>,
}

/// In-process store for tests and rehearsal runs
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(database: &str) -> Self {
        Self {
            name: database.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a document, creating the collection if needed.
    ///
    /// An `_id` is generated when missing. Fails with
    /// [`StoreError::DuplicateKey`] if any unique index already holds the key.
    pub fn insert(&self, collection: &str, mut document: Document) -> Result<(), StoreError> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }

        let mut state = self.lock();
        let coll = state
            .collections
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        for index in coll.unique_indexes() {
            let key = index_key(index, &document);
            if coll.documents.iter().any(|existing| keys_equal(&index_key(index, existing), &key)) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    index: index.name.clone(),
                });
            }
        }

        coll.documents.push(document);
        Ok(())
    }

    /// Serialize and insert a model
    pub fn insert_model<T: serde::Serialize>(&self, collection: &str, model: &T) -> Result<(), StoreError> {
        let document = mongodb::bson::to_document(model)
            .map_err(|e| StoreError::MalformedResponse(format!("cannot encode document: {}", e)))?;
        self.insert(collection, document)
    }

    /// Remove documents whose TTL has elapsed at `now`, like the server's
    /// TTL monitor. Returns the number of removed documents.
    ///
    /// A document expires once `field + expire_after <= now`; documents
    /// whose indexed field is missing or not a date are kept.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let now_millis = now.timestamp_millis();
        let mut state = self.lock();
        let mut removed = 0;

        for coll in state.collections.values_mut() {
            let ttl_fields: Vec<(String, i64)> = coll
                .indexes
                .iter()
                .filter_map(|index| {
                    let secs = index.expire_after_secs?;
                    match index.key_fields().as_slice() {
                        [field] => Some((field.to_string(), secs as i64 * 1000)),
                        _ => None,
                    }
                })
                .collect();

            for (field, ttl_millis) in ttl_fields {
                let before = coll.documents.len();
                coll.documents.retain(|document| match document.get(&field) {
                    Some(Bson::DateTime(at)) => at.timestamp_millis() + ttl_millis > now_millis,
                    _ => true,
                });
                removed += before - coll.documents.len();
            }
        }

        removed
    }

    /// Number of documents currently held by `collection`
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|coll| coll.documents.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

/// Values of the index key fields, `null` for missing fields
fn index_key(index: &IndexInfo, document: &Document) -> Vec<Bson> {
    index
        .key_fields()
        .iter()
        .map(|field| lookup(document, field).cloned().unwrap_or(Bson::Null))
        .collect()
}

fn keys_equal(a: &[Bson], b: &[Bson]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// Resolve a dotted path such as `owner.tenant_id`
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

/// Compare two numbers by value. Integers compare exactly; a double on
/// either side widens both to f64.
fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return Some(x.cmp(&y));
    }
    as_number(a)?.partial_cmp(&as_number(b)?)
}

/// Equality with numeric types compared by value, as the server does
fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(_), Some(_)) => compare_numbers(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Canonical type order used when sorting mixed values
fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) => 0,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => 1,
        Some(Bson::String(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::ObjectId(_)) => 5,
        Some(Bson::Boolean(_)) => 6,
        Some(Bson::DateTime(_)) => 7,
        Some(_) => 8,
    }
}

fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let by_type = type_rank(a).cmp(&type_rank(b));
    if by_type != Ordering::Equal {
        return by_type;
    }
    match (a, b) {
        (Some(Bson::String(x)), Some(Bson::String(y))) => x.cmp(y),
        (Some(Bson::ObjectId(x)), Some(Bson::ObjectId(y))) => x.bytes().cmp(&y.bytes()),
        (Some(Bson::Boolean(x)), Some(Bson::Boolean(y))) => x.cmp(y),
        (Some(Bson::DateTime(x)), Some(Bson::DateTime(y))) => x.cmp(y),
        (Some(x), Some(y)) => compare_numbers(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Order two documents by a sort specification; stable for equal keys
fn compare_by_sort(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let descending = as_number(direction).is_some_and(|d| d < 0.0);
        let ordering = compare_values(lookup(a, field), lookup(b, field));
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Equality match of one field; an array matches if any element does
fn field_matches(document: &Document, field: &str, expected: &Bson) -> bool {
    match lookup(document, field) {
        Some(Bson::Array(items)) => {
            items.iter().any(|item| values_equal(item, expected))
                || values_equal(&Bson::Array(items.clone()), expected)
        }
        Some(value) => values_equal(value, expected),
        None => matches!(expected, Bson::Null),
    }
}

fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| field_matches(document, field, expected))
}

/// Pick the index the planner would use: the one with the longest key
/// prefix made of filtered fields. Ties go to the earliest created index.
fn choose_index<'a>(indexes: &'a [IndexInfo], filter: &Document) -> Option<(&'a IndexInfo, Vec<String>)> {
    let mut best: Option<(&IndexInfo, Vec<String>)> = None;

    for index in indexes {
        let prefix: Vec<String> = index
            .key_fields()
            .into_iter()
            .take_while(|field| filter.contains_key(*field))
            .map(str::to_string)
            .collect();
        if prefix.is_empty() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, current)| prefix.len() > current.len()) {
            best = Some((index, prefix));
        }
    }

    best
}

fn not_found(collection: &str) -> StoreError {
    StoreError::Command {
        code: NAMESPACE_NOT_FOUND_CODE,
        code_name: "NamespaceNotFound".to_string(),
        message: format!("ns does not exist: {}", collection),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Memory
    }

    fn database_name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().collections.keys().cloned().collect())
    }

    async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.collections.contains_key(name) {
            return Err(StoreError::Command {
                code: NAMESPACE_EXISTS_CODE,
                code_name: "NamespaceExists".to_string(),
                message: format!("Collection {}.{} already exists.", self.name, name),
            });
        }
        state
            .collections
            .insert(name.to_string(), MemoryCollection::new());
        Ok(())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<String, StoreError> {
        let wanted = IndexInfo::from_spec(spec);
        let mut state = self.lock();
        let coll = state
            .collections
            .entry(spec.collection.to_string())
            .or_insert_with(MemoryCollection::new);

        if let Some(existing) = coll.indexes.iter().find(|index| index.keys == wanted.keys) {
            let same_options = existing.name == wanted.name
                && existing.unique == wanted.unique
                && existing.expire_after_secs == wanted.expire_after_secs;
            if same_options {
                return Ok(existing.name.clone());
            }
            return Err(StoreError::IndexOptionsConflict {
                collection: spec.collection.to_string(),
                index: wanted.name,
                message: format!(
                    "Index already exists with a different name or options: {}",
                    existing.name
                ),
            });
        }

        if coll.indexes.iter().any(|index| index.name == wanted.name) {
            return Err(StoreError::Command {
                code: INDEX_KEY_SPECS_CONFLICT_CODE,
                code_name: "IndexKeySpecsConflict".to_string(),
                message: format!(
                    "An existing index has the same name as the requested index: {}",
                    wanted.name
                ),
            });
        }

        if wanted.unique {
            let mut seen: Vec<Vec<Bson>> = Vec::new();
            for document in &coll.documents {
                let key = index_key(&wanted, document);
                if seen.iter().any(|other| keys_equal(other, &key)) {
                    return Err(StoreError::DuplicateKey {
                        collection: spec.collection.to_string(),
                        index: wanted.name,
                    });
                }
                seen.push(key);
            }
        }

        let name = wanted.name.clone();
        coll.indexes.push(wanted);
        Ok(name)
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, StoreError> {
        Ok(self
            .lock()
            .collections
            .get(collection)
            .map(|coll| coll.indexes.clone())
            .unwrap_or_default())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        if name == ID_INDEX_NAME {
            return Err(StoreError::Command {
                code: 72,
                code_name: "InvalidOptions".to_string(),
                message: "cannot drop _id index".to_string(),
            });
        }

        let before = coll.indexes.len();
        coll.indexes.retain(|index| index.name != name);
        if coll.indexes.len() == before {
            return Err(StoreError::Command {
                code: INDEX_NOT_FOUND_CODE,
                code_name: "IndexNotFound".to_string(),
                message: format!("index not found with name [{}]", name),
            });
        }
        Ok(())
    }

    async fn account_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.lock().accounts.contains_key(username))
    }

    async fn create_account(&self, account: &ServiceAccount) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.accounts.contains_key(&account.username) {
            return Err(StoreError::Command {
                code: USER_EXISTS_CODE,
                code_name: "Location51003".to_string(),
                message: format!("User \"{}@{}\" already exists", account.username, self.name),
            });
        }
        state
            .accounts
            .insert(account.username.clone(), account.clone());
        Ok(())
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .collections
            .get(collection)
            .map(|coll| coll.documents.iter().filter(|d| matches_filter(d, &filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn find_sorted(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        limit: i64,
    ) -> Result<Vec<Document>, StoreError> {
        let state = self.lock();
        let Some(coll) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<Document> = coll
            .documents
            .iter()
            .filter(|d| matches_filter(d, &filter))
            .cloned()
            .collect();
        if let Some(sort) = &sort {
            matching.sort_by(|a, b| compare_by_sort(a, b, sort));
        }
        if limit > 0 {
            matching.truncate(limit as usize);
        }
        Ok(matching)
    }

    async fn explain_find(&self, collection: &str, filter: Document) -> Result<Document, StoreError> {
        let started = Instant::now();
        let state = self.lock();
        let namespace = format!("{}.{}", self.name, collection);

        let Some(coll) = state.collections.get(collection) else {
            let stage = doc! { "stage": "EOF", "nReturned": 0_i64 };
            return Ok(doc! {
                "queryPlanner": { "namespace": namespace, "winningPlan": stage.clone() },
                "executionStats": {
                    "executionSuccess": true,
                    "nReturned": 0_i64,
                    "executionTimeMillis": 0_i64,
                    "totalKeysExamined": 0_i64,
                    "totalDocsExamined": 0_i64,
                    "executionStages": stage,
                },
                "ok": 1.0,
            });
        };

        let returned = coll.documents.iter().filter(|d| matches_filter(d, &filter)).count() as i64;

        let (keys_examined, docs_examined, stage) = match choose_index(&coll.indexes, &filter) {
            Some((index, prefix)) => {
                let mut bounds = Document::new();
                for field in &prefix {
                    if let Some(value) = filter.get(field) {
                        bounds.insert(field.clone(), value.clone());
                    }
                }
                let examined = coll.documents.iter().filter(|d| matches_filter(d, &bounds)).count() as i64;
                let multi_key = prefix.iter().any(|field| {
                    coll.documents
                        .iter()
                        .any(|d| matches!(lookup(d, field), Some(Bson::Array(_))))
                });
                let stage = doc! {
                    "stage": "FETCH",
                    "nReturned": returned,
                    "docsExamined": examined,
                    "inputStage": {
                        "stage": "IXSCAN",
                        "nReturned": examined,
                        "keyPattern": index.keys.clone(),
                        "indexName": index.name.clone(),
                        "isMultiKey": multi_key,
                    },
                };
                (examined, examined, stage)
            }
            None => {
                let examined = coll.documents.len() as i64;
                let stage = doc! {
                    "stage": "COLLSCAN",
                    "filter": filter.clone(),
                    "nReturned": returned,
                    "docsExamined": examined,
                    "direction": "forward",
                };
                (0, examined, stage)
            }
        };

        let elapsed = started.elapsed().as_millis() as i64;
        Ok(doc! {
            "queryPlanner": { "namespace": namespace, "winningPlan": stage.clone() },
            "executionStats": {
                "executionSuccess": true,
                "nReturned": returned,
                "executionTimeMillis": elapsed,
                "totalKeysExamined": keys_examined,
                "totalDocsExamined": docs_examined,
                "executionStages": stage,
            },
            "ok": 1.0,
        })
    }

    async fn count_by_field(&self, collection: &str, field: &str) -> Result<Vec<FieldCount>, StoreError> {
        let state = self.lock();
        let Some(coll) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut groups: Vec<FieldCount> = Vec::new();
        for document in &coll.documents {
            let value = lookup(document, field).cloned().unwrap_or(Bson::Null);
            match groups.iter_mut().find(|group| values_equal(&group.value, &value)) {
                Some(group) => group.count += 1,
                None => groups.push(FieldCount { value, count: 1 }),
            }
        }

        groups.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.value.to_string().cmp(&b.value.to_string()))
        });
        Ok(groups)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionStats, QueryPlan, Session};
    use chrono::Duration;

    fn members_index() -> IndexSpec {
        IndexSpec::ascending("cloud_iam_users", &["permission_groups", "tenant_id"])
            .named("idx_permission_groups_tenant")
            .in_background()
    }

    #[tokio::test]
    async fn test_create_collection_twice_fails() {
        let store = MemoryStore::new("db");
        store.create_collection("users").await.unwrap();

        let err = store.create_collection("users").await.unwrap_err();
        assert_eq!(err.code(), Some(NAMESPACE_EXISTS_CODE));
        assert_eq!(store.collection_names().await.unwrap(), vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn test_new_collection_has_primary_key_index() {
        let store = MemoryStore::new("db");
        store.create_collection("sessions").await.unwrap();

        let indexes = store.list_indexes("sessions").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].is_primary_key());
    }

    #[tokio::test]
    async fn test_identical_index_is_noop() {
        let store = MemoryStore::new("db");
        let spec = IndexSpec::ascending("users", &["username"]).unique();

        assert_eq!(store.create_index(&spec).await.unwrap(), "username_1");
        assert_eq!(store.create_index(&spec).await.unwrap(), "username_1");
        assert_eq!(store.list_indexes("users").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_same_key_different_options_conflicts() {
        let store = MemoryStore::new("db");
        store
            .create_index(&IndexSpec::ascending("cloud_iam_users", &["permission_groups", "tenant_id"]))
            .await
            .unwrap();

        let err = store.create_index(&members_index()).await.unwrap_err();
        assert!(err.is_index_options_conflict());
        assert_eq!(err.code(), Some(85));
    }

    #[tokio::test]
    async fn test_same_name_different_keys_conflicts() {
        let store = MemoryStore::new("db");
        store.create_index(&members_index()).await.unwrap();

        let other = IndexSpec::ascending("cloud_iam_users", &["tenant_id"]).named("idx_permission_groups_tenant");
        let err = store.create_index(&other).await.unwrap_err();
        assert!(!err.is_index_options_conflict());
        assert_eq!(err.code(), Some(INDEX_KEY_SPECS_CONFLICT_CODE));
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let store = MemoryStore::new("db");
        store
            .create_index(&IndexSpec::ascending("endpoints", &["name"]).unique())
            .await
            .unwrap();

        store.insert("endpoints", doc! { "name": "list-hosts" }).unwrap();
        let err = store.insert("endpoints", doc! { "name": "list-hosts" }).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref index, .. } if index == "name_1"));
        assert_eq!(store.len("endpoints"), 1);
    }

    #[tokio::test]
    async fn test_unique_index_keeps_large_int64_values_apart() {
        let store = MemoryStore::new("db");
        store
            .create_index(&IndexSpec::ascending("cloud_iam_users", &["id"]).unique())
            .await
            .unwrap();

        // Both round to the same f64
        let base: i64 = 1 << 53;
        store.insert("cloud_iam_users", doc! { "id": base }).unwrap();
        store.insert("cloud_iam_users", doc! { "id": base + 1 }).unwrap();
        assert_eq!(store.len("cloud_iam_users"), 2);

        let found = store
            .count_documents("cloud_iam_users", doc! { "id": base + 1 })
            .await
            .unwrap();
        assert_eq!(found, 1);
        assert!(values_equal(&Bson::Int32(7), &Bson::Int64(7)));
        assert!(values_equal(&Bson::Int64(7), &Bson::Double(7.0)));
        assert!(!values_equal(&Bson::Int64(base), &Bson::Int64(base + 1)));
    }

    #[tokio::test]
    async fn test_find_sorted_descending_with_limit() {
        let store = MemoryStore::new("db");
        for (name, ctime) in [("b", 20_i64), ("a", 10), ("d", 40), ("c", 30)] {
            store.insert("cloud_iam_users", doc! { "username": name, "ctime": ctime }).unwrap();
        }
        store.insert("cloud_iam_users", doc! { "username": "no-ctime" }).unwrap();

        let docs = store
            .find_sorted("cloud_iam_users", Document::new(), Some(doc! { "ctime": -1 }), 3)
            .await
            .unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.get_str("username").unwrap()).collect();
        assert_eq!(names, vec!["d", "c", "b"]);

        let docs = store
            .find_sorted("cloud_iam_users", Document::new(), Some(doc! { "ctime": 1 }), 0)
            .await
            .unwrap();
        assert_eq!(docs[0].get_str("username").unwrap(), "no-ctime");
        assert_eq!(docs[1].get_str("username").unwrap(), "a");

        // Natural order without a sort
        let docs = store.find("cloud_iam_users", Document::new(), 1).await.unwrap();
        assert_eq!(docs[0].get_str("username").unwrap(), "b");
    }

    #[tokio::test]
    async fn test_unique_index_build_fails_on_existing_duplicates() {
        let store = MemoryStore::new("db");
        store.insert("users", doc! { "email": "a@example.com" }).unwrap();
        store.insert("users", doc! { "email": "a@example.com" }).unwrap();

        let err = store
            .create_index(&IndexSpec::ascending("users", &["email"]).unique())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(11000));
    }

    #[tokio::test]
    async fn test_non_unique_index_allows_duplicates() {
        let store = MemoryStore::new("db");
        store
            .create_index(&IndexSpec::ascending("sessions", &["user_id"]))
            .await
            .unwrap();

        store.insert("sessions", doc! { "user_id": "u-1" }).unwrap();
        store.insert("sessions", doc! { "user_id": "u-1" }).unwrap();
        assert_eq!(store.len("sessions"), 2);
    }

    #[tokio::test]
    async fn test_purge_expired_sessions() {
        let store = MemoryStore::new("db");
        store
            .create_index(&IndexSpec::ascending("sessions", &["expires_at"]).expire_after(0))
            .await
            .unwrap();

        let now = Utc::now();
        let mut stale = Session::new("s-old", "u-1", Duration::zero());
        stale.expires_at = now - Duration::seconds(5);
        let mut fresh = Session::new("s-new", "u-1", Duration::zero());
        fresh.expires_at = now + Duration::minutes(5);

        store.insert_model("sessions", &stale).unwrap();
        store.insert_model("sessions", &fresh).unwrap();

        assert_eq!(store.purge_expired(now), 1);
        assert_eq!(store.len("sessions"), 1);
        assert_eq!(store.purge_expired(now + Duration::minutes(5)), 1);
        assert!(store.is_empty("sessions"));
    }

    #[tokio::test]
    async fn test_purge_without_ttl_index_keeps_documents() {
        let store = MemoryStore::new("db");
        let session = Session::new("s-1", "u-1", Duration::zero());
        store.insert_model("sessions", &session).unwrap();

        assert_eq!(store.purge_expired(Utc::now() + Duration::days(1)), 0);
        assert_eq!(store.len("sessions"), 1);
    }

    #[tokio::test]
    async fn test_array_field_matches_element() {
        let store = MemoryStore::new("db");
        store
            .insert("cloud_iam_users", doc! { "username": "a", "permission_groups": [1_i64, 2_i64], "tenant_id": "t1" })
            .unwrap();
        store
            .insert("cloud_iam_users", doc! { "username": "b", "permission_groups": [2_i64], "tenant_id": "t1" })
            .unwrap();

        let filter = doc! { "permission_groups": 1_i64, "tenant_id": "t1" };
        assert_eq!(store.count_documents("cloud_iam_users", filter.clone()).await.unwrap(), 1);

        // Int32 in the filter matches Int64 in the document
        let found = store
            .find("cloud_iam_users", doc! { "permission_groups": 2 }, 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let limited = store
            .find("cloud_iam_users", doc! { "tenant_id": "t1" }, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_explain_uses_compound_index() {
        let store = MemoryStore::new("db");
        store.create_index(&members_index()).await.unwrap();
        for (i, tenant) in ["t1", "t1", "t2"].iter().enumerate() {
            store
                .insert(
                    "cloud_iam_users",
                    doc! { "id": i as i64, "permission_groups": [1_i64], "tenant_id": *tenant },
                )
                .unwrap();
        }

        let explain = store
            .explain_find("cloud_iam_users", doc! { "permission_groups": 1_i64, "tenant_id": "t1" })
            .await
            .unwrap();
        let stats = ExecutionStats::from_explain(&explain).unwrap();

        assert!(stats.uses_index("idx_permission_groups_tenant"));
        assert_eq!(stats.n_returned, 2);
        assert_eq!(stats.total_docs_examined, 2);
    }

    #[tokio::test]
    async fn test_explain_without_index_is_collection_scan() {
        let store = MemoryStore::new("db");
        for tenant in ["t1", "t2", "t3"] {
            store
                .insert("cloud_iam_users", doc! { "permission_groups": [1_i64], "tenant_id": tenant })
                .unwrap();
        }

        let explain = store
            .explain_find("cloud_iam_users", doc! { "permission_groups": 1_i64, "tenant_id": "t1" })
            .await
            .unwrap();
        let stats = ExecutionStats::from_explain(&explain).unwrap();

        assert_eq!(stats.plan, QueryPlan::CollectionScan);
        assert_eq!(stats.total_docs_examined, 3);
        assert_eq!(stats.n_returned, 1);
    }

    #[tokio::test]
    async fn test_explain_prefers_longest_prefix() {
        let store = MemoryStore::new("db");
        store
            .create_index(&IndexSpec::ascending("cloud_iam_users", &["permission_groups"]))
            .await
            .unwrap();
        store.create_index(&members_index()).await.unwrap();
        store
            .insert("cloud_iam_users", doc! { "permission_groups": [1_i64], "tenant_id": "t1" })
            .unwrap();

        let explain = store
            .explain_find("cloud_iam_users", doc! { "permission_groups": 1_i64, "tenant_id": "t1" })
            .await
            .unwrap();
        let stats = ExecutionStats::from_explain(&explain).unwrap();
        assert!(stats.uses_index("idx_permission_groups_tenant"));
    }

    #[tokio::test]
    async fn test_explain_missing_collection() {
        let store = MemoryStore::new("db");
        let explain = store
            .explain_find("cloud_iam_users", doc! { "tenant_id": "t1" })
            .await
            .unwrap();
        let stats = ExecutionStats::from_explain(&explain).unwrap();
        assert_eq!(stats.n_returned, 0);
        assert_eq!(stats.plan, QueryPlan::Other { stage: "EOF".to_string() });
    }

    #[tokio::test]
    async fn test_drop_index() {
        let store = MemoryStore::new("db");
        store
            .create_index(&IndexSpec::ascending("tenants", &["name"]))
            .await
            .unwrap();

        store.drop_index("tenants", "name_1").await.unwrap();
        assert_eq!(store.list_indexes("tenants").await.unwrap().len(), 1);

        let err = store.drop_index("tenants", "name_1").await.unwrap_err();
        assert_eq!(err.code(), Some(INDEX_NOT_FOUND_CODE));
        assert!(store.drop_index("tenants", ID_INDEX_NAME).await.is_err());
        assert!(store.drop_index("missing", "x_1").await.is_err());
    }

    #[tokio::test]
    async fn test_accounts() {
        let store = MemoryStore::new("db");
        let account = ServiceAccount {
            username: "svc".to_string(),
            password: "pw".to_string(),
            role: "readWrite".to_string(),
        };

        assert!(!store.account_exists("svc").await.unwrap());
        store.create_account(&account).await.unwrap();
        assert!(store.account_exists("svc").await.unwrap());

        let err = store.create_account(&account).await.unwrap_err();
        assert_eq!(err.code(), Some(USER_EXISTS_CODE));
    }

    #[tokio::test]
    async fn test_count_by_field() {
        let store = MemoryStore::new("db");
        for tenant in ["t2", "t1", "t2", ""] {
            store.insert("cloud_iam_users", doc! { "tenant_id": tenant }).unwrap();
        }
        store.insert("cloud_iam_users", doc! { "username": "no-tenant" }).unwrap();

        let groups = store.count_by_field("cloud_iam_users", "tenant_id").await.unwrap();
        assert_eq!(groups[0].value, Bson::String("t2".to_string()));
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups.iter().map(|g| g.count).sum::<u64>(), 5);

        assert!(store.count_by_field("missing", "tenant_id").await.unwrap().is_empty());
    }
}
