//! Services layer
//!
//! This module contains the commands of the schema tool. Services are
//! responsible for:
//! - Issuing the administrative calls in the right order
//! - Deciding which failures abort a run and which are only reported
//! - Producing a report that renders as console text or serializes to JSON

pub mod account;
pub mod census;
pub mod diagnostics;
pub mod maintenance;
pub mod schema;

pub use account::AccountService;
pub use census::{CensusReport, QueryCount, UserCensus};
pub use diagnostics::{GroupMembersReport, GroupMembersReporter};
pub use maintenance::{CleanupReport, CollectionCleanup, DropStatus, IndexCleanupService, IndexDrop};
pub use schema::{SchemaReport, SchemaService, StatusReport};
