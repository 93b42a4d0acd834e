//! Core domain types shared across Parley crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum accepted length of a session identifier.
pub const MAX_SESSION_ID_LEN: usize = 50;

/// Session id used when the caller supplies none.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A message persisted in the per-session history list.
///
/// `seq` is assigned by the store and is monotone within a session; it is
/// the turn identity used to exclude the in-flight query from context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub seq: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One completed turn, written once to the archive store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedTurn {
    pub session_id: String,
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

/// Why a streamed channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Done,
    Cancelled,
    Error,
    Timeout,
}

impl EndReason {
    /// Terminal sentinel payload for the plain SSE channel.
    pub fn sentinel(&self) -> &'static str {
        match self {
            EndReason::Done => "[DONE]",
            EndReason::Cancelled => "[CANCELLED]",
            EndReason::Error | EndReason::Timeout => "[ERROR]",
        }
    }
}

/// Normalize a caller-supplied session identifier at the boundary.
///
/// Trims whitespace and substitutes the default id for an empty string.
/// Returns `None` if the trimmed id exceeds [`MAX_SESSION_ID_LEN`].
pub fn normalize_session_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() > MAX_SESSION_ID_LEN {
        return None;
    }
    if trimmed.is_empty() {
        Some(DEFAULT_SESSION_ID.to_string())
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_unknown_role_is_error() {
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn test_normalize_session_id_trims() {
        assert_eq!(normalize_session_id("  abc  ").as_deref(), Some("abc"));
    }

    #[test]
    fn test_normalize_session_id_empty_is_default() {
        assert_eq!(normalize_session_id("").as_deref(), Some(DEFAULT_SESSION_ID));
        assert_eq!(
            normalize_session_id("   ").as_deref(),
            Some(DEFAULT_SESSION_ID)
        );
    }

    #[test]
    fn test_normalize_session_id_too_long() {
        let long = "x".repeat(MAX_SESSION_ID_LEN + 1);
        assert!(normalize_session_id(&long).is_none());
        let at_max = "x".repeat(MAX_SESSION_ID_LEN);
        assert!(normalize_session_id(&at_max).is_some());
    }

    #[test]
    fn test_end_reason_sentinels() {
        assert_eq!(EndReason::Done.sentinel(), "[DONE]");
        assert_eq!(EndReason::Cancelled.sentinel(), "[CANCELLED]");
        assert_eq!(EndReason::Error.sentinel(), "[ERROR]");
        assert_eq!(EndReason::Timeout.sentinel(), "[ERROR]");
    }

    #[test]
    fn test_stored_message_serde() {
        let msg = StoredMessage {
            seq: 4,
            role: Role::User,
            content: "hello".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: StoredMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, 4);
        assert_eq!(back.role, Role::User);
        assert_eq!(back.content, "hello");
    }
}
