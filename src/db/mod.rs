//! Database layer
//!
//! This module provides the storage abstraction for the schema tool.
//! It supports:
//! - MongoDB (default), through the official async driver
//! - An in-memory store, for tests and rehearsal runs
//!
//! The store driver is selected based on configuration.
//!
//! # Architecture
//!
//! The database layer uses a trait-based abstraction (`DocumentStore`) so
//! the services work with either backend without knowing which one is in
//! use. The declared collections and indexes live in [`schema`].
//!
//! # Usage
//!
//! ```ignore
//! use ecam_schema::config::DatabaseConfig;
//! use ecam_schema::db::{create_store, schema};
//!
//! let config = DatabaseConfig::default();
//! let store = create_store(&config).await?;
//!
//! schema::ensure_collections(&store).await?;
//! schema::ensure_indexes(&store).await;
//! ```

pub mod memory;
pub mod schema;
pub mod store;

pub use memory::MemoryStore;
pub use store::{
    create_store, create_test_store, redact, DocumentStore, DynDocumentStore, MongoStore,
    StoreError,
};
