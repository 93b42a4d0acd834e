//! LLM context assembly from stored history.
//!
//! The in-flight user message is excluded from history by its sequence
//! number, an explicit identity rather than a content comparison, so
//! repeated identical queries cannot drop legitimate history.

use parley_core::types::{Role, StoredMessage};
use parley_llm::ChatMessage;
use parley_tools::ToolOutcome;
use tracing::debug;

fn history_to_messages<'a>(
    history: impl Iterator<Item = &'a StoredMessage>,
    current_seq: i64,
) -> Vec<ChatMessage> {
    history
        .filter(|m| m.seq < current_seq)
        .map(|m| ChatMessage::new(m.role, m.content.clone()))
        .collect()
}

/// Build the decision context: `[system] + history + [query]`. When the
/// list would exceed `context_limit` non-system entries, keep the system
/// prompt plus the last `context_limit`, a contiguous right trim.
pub fn build_context(
    system_prompt: &str,
    history: &[StoredMessage],
    query: &str,
    current_seq: i64,
    context_limit: usize,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(Role::System, system_prompt)];
    messages.extend(history_to_messages(history.iter(), current_seq));
    messages.push(ChatMessage::new(Role::User, query));

    if messages.len() > context_limit + 1 {
        let keep_from = messages.len() - context_limit;
        let mut trimmed = vec![messages[0].clone()];
        trimmed.extend_from_slice(&messages[keep_from..]);
        debug!(
            dropped = keep_from - 1,
            "Trimmed conversation context to fit window"
        );
        return trimmed;
    }
    messages
}

/// Build the synthesis context: formatting prompt, a short history tail,
/// the current turn's query and tool-call exchange, then one tool-role
/// message per outcome.
pub fn build_synthesis_context(
    system_prompt: &str,
    history: &[StoredMessage],
    query: &str,
    current_seq: i64,
    decision_content: &str,
    tool_calls: &[parley_llm::ToolCallRequest],
    outcomes: &[ToolOutcome],
    history_tail: usize,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(Role::System, system_prompt)];

    let tail_start = history.len().saturating_sub(history_tail);
    messages.extend(history_to_messages(history[tail_start..].iter(), current_seq));

    messages.push(ChatMessage::new(Role::User, query));

    // The assistant message lists only calls that produced an outcome, so
    // every tool-call id pairs with exactly one tool-role message.
    let mut assistant = ChatMessage::new(Role::Assistant, decision_content);
    assistant.tool_calls = Some(
        tool_calls
            .iter()
            .filter(|c| outcomes.iter().any(|o| o.tool_call_id == c.id))
            .cloned()
            .collect(),
    );
    messages.push(assistant);

    for outcome in outcomes {
        messages.push(ChatMessage::tool_result(
            outcome.tool_call_id.clone(),
            outcome.payload_string(),
        ));
    }
    messages
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored(seq: i64, role: Role, content: &str) -> StoredMessage {
        StoredMessage {
            seq,
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn alternating_history(n: usize) -> Vec<StoredMessage> {
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                stored(i as i64 + 1, role, &format!("m{}", i))
            })
            .collect()
    }

    #[test]
    fn test_basic_assembly() {
        let history = alternating_history(4);
        let messages = build_context("sys", &history, "current", 100, 20);

        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "m0");
        assert_eq!(messages[5].content, "current");
        assert_eq!(messages[5].role, Role::User);
    }

    #[test]
    fn test_current_seq_excluded_by_identity() {
        // The in-flight message (seq 3) is excluded even though an older
        // message repeats its exact text.
        let history = vec![
            stored(1, Role::User, "what time is it"),
            stored(2, Role::Assistant, "noon"),
            stored(3, Role::User, "what time is it"),
        ];
        let messages = build_context("sys", &history, "what time is it", 3, 20);

        // system + seq1 + seq2 + current query.
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "what time is it");
        assert_eq!(messages[2].content, "noon");
    }

    #[test]
    fn test_never_exceeds_max_entries() {
        let history = alternating_history(40);
        let messages = build_context("sys", &history, "current", 100, 20);

        assert_eq!(messages.len(), 21);
        assert_eq!(messages[0].role, Role::System);
        // Contiguous right trim keeps the newest entries and the query.
        assert_eq!(messages.last().unwrap().content, "current");
        assert_eq!(messages[1].content, "m20");
    }

    #[test]
    fn test_trim_is_contiguous_and_ordered() {
        let history = alternating_history(30);
        let messages = build_context("sys", &history, "current", 100, 20);

        let contents: Vec<&str> = messages[1..messages.len() - 1]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        let expected: Vec<String> = (11..30).map(|i| format!("m{}", i)).collect();
        assert_eq!(contents, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_synthesis_context_shape() {
        use parley_llm::ToolCallRequest;
        use parley_tools::ToolOutcome;

        let history = alternating_history(8);
        let calls = vec![
            ToolCallRequest {
                id: "c1".to_string(),
                name: "get_bio".to_string(),
                arguments: r#"{"subject":"X"}"#.to_string(),
            },
            ToolCallRequest {
                id: "c2".to_string(),
                name: "search_images".to_string(),
                arguments: r#"{"subject":"X"}"#.to_string(),
            },
        ];
        let outcomes = vec![
            ToolOutcome::success("get_bio", "c1", serde_json::json!("X: person"), 5),
            ToolOutcome::failure("search_images", "c2", "offline", 3),
        ];
        let messages =
            build_synthesis_context("fmt", &history, "who is X", 100, "", &calls, &outcomes, 5);

        // system + 5 history tail + user + assistant + 2 tool messages.
        assert_eq!(messages.len(), 10);
        assert_eq!(messages[0].content, "fmt");
        assert_eq!(messages[1].content, "m3");
        assert_eq!(messages[6].content, "who is X");
        assert_eq!(messages[7].role, Role::Assistant);
        assert!(messages[7].tool_calls.is_some());
        assert_eq!(messages[8].role, Role::Tool);
        assert_eq!(messages[8].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(messages[9].tool_call_id.as_deref(), Some("c2"));
    }

    #[test]
    fn test_synthesis_tail_excludes_current_seq() {
        let history = vec![
            stored(1, Role::User, "old"),
            stored(2, Role::User, "current query"),
        ];
        let messages =
            build_synthesis_context("fmt", &history, "current query", 2, "", &[], &[], 5);
        // system + seq1 + user + assistant: seq2 is the in-flight message.
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "old");
    }
}
