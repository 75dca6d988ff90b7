//! tokenindex-storage: persistent [`KvStore`] backends for the token index.
//!
//! # Backends
//! - [`MemoryStore`]: in-memory (re-exported from core; dev/testing)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use tokenindex_core::store::{KvStore, MemoryStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
