//! Parley history crate - session history and turn archive stores.
//!
//! The [`HistoryStore`] holds the append-only per-session message list that
//! feeds LLM context; the [`ArchiveStore`] records one document per completed
//! turn. Both are traits so the server can run against SQLite in production
//! and in-memory fakes in tests.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use db::Database;
pub use memory::{MemoryArchiveStore, MemoryHistoryStore};
pub use sqlite::{SqliteArchiveStore, SqliteHistoryStore};
pub use store::{ArchiveStore, HistoryStore};
