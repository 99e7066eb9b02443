//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for credentials,
//! activities and milestones. The trait-based design allows swapping between
//! the in-memory store (tests) and the SQLite store.

mod memory;
mod snapshot;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use snapshot::SnapshotDir;
pub use sqlite::SqliteStore;
pub use traits::{ActivityStore, CredentialStore, MilestoneStore};
