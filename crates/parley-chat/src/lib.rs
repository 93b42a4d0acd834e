//! Parley chat crate - the orchestration engine.
//!
//! Runs the two-phase protocol per turn: a decision completion that may
//! request tools, sequential tool execution, then a synthesis completion
//! delivered whole or as buffered chunks. History windowing and the
//! persist-once rule live here too.

pub mod buffer;
pub mod context;
pub mod events;
pub mod orchestrator;
pub mod prompts;

pub use buffer::{ChunkBuffer, EventBatcher};
pub use events::{ChatEvent, ChatEventStream};
pub use orchestrator::ChatOrchestrator;
