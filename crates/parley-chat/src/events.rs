//! Events emitted by a streamed turn.

use tokio::sync::mpsc;

use parley_core::types::EndReason;

/// One event on a streamed chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A flushed text chunk.
    Text(String),
    /// Terminal event; nothing follows it.
    End(EndReason),
}

/// Receiver side of a streamed turn.
pub type ChatEventStream = mpsc::Receiver<ChatEvent>;
