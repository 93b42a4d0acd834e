//! SQLite-backed store implementations.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;
use uuid::Uuid;

use parley_core::types::{ArchivedTurn, Role, StoredMessage};
use parley_core::{ParleyError, Result};

use crate::db::Database;
use crate::store::{ArchiveStore, HistoryStore};

pub struct SqliteHistoryStore {
    db: Arc<Database>,
}

impl SqliteHistoryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_message(seq: i64, role: String, content: String, ts: i64) -> Result<StoredMessage> {
    let role = Role::from_str(&role).map_err(ParleyError::History)?;
    let timestamp = DateTime::<Utc>::from_timestamp(ts, 0)
        .ok_or_else(|| ParleyError::History(format!("invalid stored timestamp: {}", ts)))?;
    Ok(StoredMessage {
        seq,
        role,
        content,
        timestamp,
    })
}

fn read_messages(
    db: &Database,
    session_id: &str,
    limit: usize,
    roles_only: bool,
) -> Result<Vec<StoredMessage>> {
    let sql = if roles_only {
        "SELECT seq, role, content, timestamp FROM messages
         WHERE session_id = ?1 AND role IN ('user', 'assistant')
         ORDER BY seq DESC LIMIT ?2"
    } else {
        "SELECT seq, role, content, timestamp FROM messages
         WHERE session_id = ?1
         ORDER BY seq DESC LIMIT ?2"
    };

    let mut messages = db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ParleyError::History(e.to_string()))?;
        let rows = stmt
            .query_map(params![session_id, limit as i64], row_to_message)
            .map_err(|e| ParleyError::History(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (seq, role, content, ts) =
                row.map_err(|e| ParleyError::History(e.to_string()))?;
            out.push(build_message(seq, role, content, ts)?);
        }
        Ok(out)
    })?;

    // Query walks newest-first for the LIMIT; callers want oldest-first.
    messages.reverse();
    Ok(messages)
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<i64> {
        let seq = self.db.with_conn(|conn| {
            let next: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .map_err(|e| ParleyError::History(e.to_string()))?;
            conn.execute(
                "INSERT INTO messages (session_id, seq, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, next, role.as_str(), content, Utc::now().timestamp()],
            )
            .map_err(|e| ParleyError::History(e.to_string()))?;
            Ok(next)
        })?;
        debug!(session = session_id, seq, role = %role, "Message appended");
        Ok(seq)
    }

    async fn read_recent(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        read_messages(&self.db, session_id, limit, true)
    }

    async fn read_all(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        read_messages(&self.db, session_id, limit, false)
    }

    async fn clear(&self, session_id: &str) -> Result<u64> {
        let deleted = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM messages WHERE session_id = ?1",
                params![session_id],
            )
            .map_err(|e| ParleyError::History(e.to_string()))
        })?;
        Ok(deleted as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| ParleyError::History(e.to_string()))
        })
    }
}

pub struct SqliteArchiveStore {
    db: Arc<Database>,
}

impl SqliteArchiveStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ArchiveStore for SqliteArchiveStore {
    async fn record_turn(&self, turn: &ArchivedTurn) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO turns (id, session_id, user_text, assistant_text, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    turn.session_id,
                    turn.user,
                    turn.assistant,
                    turn.timestamp.timestamp()
                ],
            )
            .map_err(|e| ParleyError::Archive(e.to_string()))?;
            Ok(())
        })
    }

    async fn ping(&self) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| ParleyError::Archive(e.to_string()))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> SqliteHistoryStore {
        SqliteHistoryStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_append_assigns_monotone_seq() {
        let store = history();
        let s1 = store.append("s", Role::User, "one").await.unwrap();
        let s2 = store.append("s", Role::Assistant, "two").await.unwrap();
        let s3 = store.append("s", Role::User, "three").await.unwrap();
        assert_eq!((s1, s2, s3), (1, 2, 3));
    }

    #[tokio::test]
    async fn test_seq_is_per_session() {
        let store = history();
        store.append("a", Role::User, "x").await.unwrap();
        let seq = store.append("b", Role::User, "y").await.unwrap();
        assert_eq!(seq, 1);
    }

    #[tokio::test]
    async fn test_read_recent_filters_roles_and_orders() {
        let store = history();
        store.append("s", Role::User, "q1").await.unwrap();
        store.append("s", Role::Assistant, "a1").await.unwrap();
        store.append("s", Role::Tool, "tool blob").await.unwrap();
        store.append("s", Role::User, "q2").await.unwrap();

        let recent = store.read_recent("s", 10).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2"]);
    }

    #[tokio::test]
    async fn test_read_recent_limit_keeps_newest() {
        let store = history();
        for i in 0..5 {
            store
                .append("s", Role::User, &format!("m{}", i))
                .await
                .unwrap();
        }
        let recent = store.read_recent("s", 2).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn test_read_all_includes_every_role() {
        let store = history();
        store.append("s", Role::User, "q").await.unwrap();
        store.append("s", Role::Tool, "t").await.unwrap();
        assert_eq!(store.read_all("s", 50).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_reports_deleted_count() {
        let store = history();
        store.append("s", Role::User, "q").await.unwrap();
        store.append("s", Role::Assistant, "a").await.unwrap();
        assert_eq!(store.clear("s").await.unwrap(), 2);
        assert_eq!(store.clear("s").await.unwrap(), 0);
        assert!(store.read_all("s", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_archive_records_turns() {
        let db = Arc::new(Database::in_memory().unwrap());
        let archive = SqliteArchiveStore::new(Arc::clone(&db));

        archive
            .record_turn(&ArchivedTurn {
                session_id: "s".to_string(),
                user: "hello".to_string(),
                assistant: "hi".to_string(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))
                    .map_err(|e| ParleyError::Archive(e.to_string()))
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_ping() {
        let store = history();
        store.ping().await.unwrap();
    }
}
