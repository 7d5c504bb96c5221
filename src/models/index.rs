//! Index model
//!
//! `IndexSpec` is the declared form of an index (what the schema wants),
//! `IndexInfo` is the form reported back by the database.

use mongodb::bson::{Bson, Document};
use serde::Serialize;

/// Name the server gives the mandatory `_id` index
pub const ID_INDEX_NAME: &str = "_id_";

/// Declared index on a collection.
///
/// Keys are always ascending. Specs are `const`-constructible so the whole
/// schema can live in a static table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Collection the index belongs to
    pub collection: &'static str,
    /// Indexed fields, in key order
    pub keys: &'static [&'static str],
    /// Explicit index name; the server default is used when `None`
    pub name: Option<&'static str>,
    /// Reject documents with a duplicate key
    pub unique: bool,
    /// TTL in seconds, counted from the indexed timestamp
    pub expire_after_secs: Option<u64>,
    /// Build without blocking reads and writes
    pub background: bool,
}

impl IndexSpec {
    /// Plain ascending index over `keys`
    pub const fn ascending(collection: &'static str, keys: &'static [&'static str]) -> Self {
        Self {
            collection,
            keys,
            name: None,
            unique: false,
            expire_after_secs: None,
            background: false,
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub const fn named(self, name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..self
        }
    }

    pub const fn expire_after(self, secs: u64) -> Self {
        Self {
            expire_after_secs: Some(secs),
            ..self
        }
    }

    pub const fn in_background(self) -> Self {
        Self {
            background: true,
            ..self
        }
    }

    /// Index name, falling back to the server's `field_1_other_1` convention
    pub fn index_name(&self) -> String {
        match self.name {
            Some(name) => name.to_string(),
            None => default_index_name(self.keys),
        }
    }

    /// Key pattern document, e.g. `{ "permission_groups": 1, "tenant_id": 1 }`
    pub fn key_document(&self) -> Document {
        let mut keys = Document::new();
        for field in self.keys {
            keys.insert(*field, 1i32);
        }
        keys
    }

    pub fn is_compound(&self) -> bool {
        self.keys.len() > 1
    }
}

/// Default name the server derives from an ascending key pattern
pub fn default_index_name(keys: &[&str]) -> String {
    keys.iter()
        .map(|field| format!("{}_1", field))
        .collect::<Vec<_>>()
        .join("_")
}

/// Index as reported by `listIndexes`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
}

impl IndexInfo {
    /// What the server is expected to report once `spec` has been created
    pub fn from_spec(spec: &IndexSpec) -> Self {
        Self {
            name: spec.index_name(),
            keys: spec.key_document(),
            unique: spec.unique,
            expire_after_secs: spec.expire_after_secs,
            background: spec.background.then_some(true),
        }
    }

    /// The mandatory primary key index every collection starts with
    pub fn primary_key() -> Self {
        let mut keys = Document::new();
        keys.insert("_id", 1i32);
        Self {
            name: ID_INDEX_NAME.to_string(),
            keys,
            unique: false,
            expire_after_secs: None,
            background: None,
        }
    }

    /// Indexed fields, in key order
    pub fn key_fields(&self) -> Vec<&str> {
        self.keys.keys().map(|k| k.as_str()).collect()
    }

    /// Whether `field` is part of the key pattern
    pub fn covers_field(&self, field: &str) -> bool {
        self.keys.contains_key(field)
    }

    pub fn is_primary_key(&self) -> bool {
        self.name == ID_INDEX_NAME
    }

    /// Key pattern rendered as compact JSON, e.g. `{"tenant_id":1}`
    pub fn key_json(&self) -> String {
        let pairs: Vec<String> = self
            .keys
            .iter()
            .map(|(field, direction)| format!("\"{}\":{}", field, render_direction(direction)))
            .collect();
        format!("{{{}}}", pairs.join(","))
    }
}

fn render_direction(direction: &Bson) -> String {
    match direction {
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) => n.to_string(),
        Bson::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

/// Result of ensuring one collection exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionOutcome {
    pub name: String,
    /// `false` when the collection was already there
    pub created: bool,
}

/// Result of ensuring one index exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexOutcome {
    pub collection: String,
    pub name: String,
    pub status: EnsureStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnsureStatus {
    /// Created, or already present with identical options
    Ensured,
    /// An index with the same key exists with different options; left untouched
    Conflict { message: String },
    Failed { message: String },
}

impl IndexOutcome {
    pub fn is_ensured(&self) -> bool {
        matches!(self.status, EnsureStatus::Ensured)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.status, EnsureStatus::Conflict { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, EnsureStatus::Failed { .. })
    }
}
