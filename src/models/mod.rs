//! Data models
//!
//! This module contains the data structures used throughout the schema tool:
//! - Records of the managed collections (User, Session, Endpoint, CloudIamUser,
//!   CloudIamGroup)
//! - Declared and reported indexes
//! - Engine-reported statistics
//! - The service account

mod account;
mod endpoint;
mod iam_user;
mod index;
mod session;
mod stats;
mod user;

pub use account::{AccountOutcome, ServiceAccount};
pub use endpoint::Endpoint;
pub use iam_user::{CloudIamGroup, CloudIamUser};
pub use index::{
    default_index_name, CollectionOutcome, EnsureStatus, IndexInfo, IndexOutcome, IndexSpec,
    ID_INDEX_NAME,
};
pub use session::Session;
pub use stats::{ExecutionStats, FieldCount, QueryPlan, StatsError};
pub use user::User;
