//! In-memory store implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use parley_core::types::{ArchivedTurn, Role, StoredMessage};
use parley_core::{ParleyError, Result};

use crate::store::{ArchiveStore, HistoryStore};

/// HashMap-backed history store. Set `unavailable` to simulate an
/// unreachable backend for health-check tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    sessions: Mutex<HashMap<String, Vec<StoredMessage>>>,
    unavailable: Mutex<bool>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            Err(ParleyError::History("history store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<i64> {
        self.check_available()?;
        let mut sessions = self.sessions.lock().unwrap();
        let list = sessions.entry(session_id.to_string()).or_default();
        let seq = list.last().map(|m| m.seq).unwrap_or(0) + 1;
        list.push(StoredMessage {
            seq,
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        Ok(seq)
    }

    async fn read_recent(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        self.check_available()?;
        let sessions = self.sessions.lock().unwrap();
        let list = sessions.get(session_id).cloned().unwrap_or_default();
        let filtered: Vec<StoredMessage> = list
            .into_iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .collect();
        let start = filtered.len().saturating_sub(limit);
        Ok(filtered[start..].to_vec())
    }

    async fn read_all(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        self.check_available()?;
        let sessions = self.sessions.lock().unwrap();
        let list = sessions.get(session_id).cloned().unwrap_or_default();
        let start = list.len().saturating_sub(limit);
        Ok(list[start..].to_vec())
    }

    async fn clear(&self, session_id: &str) -> Result<u64> {
        self.check_available()?;
        let removed = self
            .sessions
            .lock()
            .unwrap()
            .remove(session_id)
            .map(|list| list.len() as u64)
            .unwrap_or(0);
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

/// Vec-backed archive store recording turns in order.
#[derive(Default)]
pub struct MemoryArchiveStore {
    turns: Mutex<Vec<ArchivedTurn>>,
    unavailable: Mutex<bool>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn recorded_turns(&self) -> Vec<ArchivedTurn> {
        self.turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn record_turn(&self, turn: &ArchivedTurn) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(ParleyError::Archive("archive store unavailable".to_string()));
        }
        self.turns.lock().unwrap().push(turn.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            Err(ParleyError::Archive("archive store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_history_matches_sqlite_semantics() {
        let store = MemoryHistoryStore::new();
        store.append("s", Role::User, "q1").await.unwrap();
        store.append("s", Role::Tool, "t").await.unwrap();
        let seq = store.append("s", Role::Assistant, "a1").await.unwrap();
        assert_eq!(seq, 3);

        let recent = store.read_recent("s", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "q1");

        assert_eq!(store.read_all("s", 10).await.unwrap().len(), 3);
        assert_eq!(store.clear("s").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_ping() {
        let store = MemoryHistoryStore::new();
        store.ping().await.unwrap();
        store.set_unavailable(true);
        assert!(store.ping().await.is_err());
        assert!(store.append("s", Role::User, "q").await.is_err());
    }

    #[tokio::test]
    async fn test_archive_records_in_order() {
        let archive = MemoryArchiveStore::new();
        for text in ["first", "second"] {
            archive
                .record_turn(&ArchivedTurn {
                    session_id: "s".to_string(),
                    user: text.to_string(),
                    assistant: format!("re: {}", text),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
        let turns = archive.recorded_turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "first");
    }
}
