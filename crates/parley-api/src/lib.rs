//! Parley API crate - HTTP, SSE, and WebSocket surface.
//!
//! Three delivery channels share one orchestration engine: a whole-response
//! JSON endpoint, two SSE streaming endpoints, and a voice WebSocket that
//! runs endpointed transcription before the chat turn. Validation and rate
//! limiting happen here at the boundary.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use rate_limit::{RateLimiter, RequestClass};
pub use routes::{create_router, start_server};
pub use state::AppState;
