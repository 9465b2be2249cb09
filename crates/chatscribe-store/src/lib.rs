//! Chatscribe Store: SQLite persistence for targets, identities, chat and viewer snapshots.

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::*;
