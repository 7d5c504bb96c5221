//! ecam-schema - Schema bootstrap and diagnostics for the e-cam database
//!
//! This library provides the collections, indexes and service account the
//! e-cam service expects, and read-only reports on the IAM user data.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
