//! Store traits for session history and the turn archive.

use async_trait::async_trait;

use parley_core::types::{ArchivedTurn, Role, StoredMessage};
use parley_core::Result;

/// Append-only per-session message list.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a message and return its store-assigned sequence number.
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<i64>;

    /// Last `limit` user/assistant messages, oldest first. Tool and system
    /// messages never reach the store, but the role filter defends against
    /// stray records anyway.
    async fn read_recent(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Last `limit` stored messages of any role, oldest first.
    async fn read_all(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Delete the session's list. Returns the number of removed messages.
    async fn clear(&self, session_id: &str) -> Result<u64>;

    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> Result<()>;
}

/// Durable record of completed turns.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Write one turn document. Best effort; callers log failures and move on.
    async fn record_turn(&self, turn: &ArchivedTurn) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
