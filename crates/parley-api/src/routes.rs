//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, and all endpoint
//! handlers.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_core::{ParleyError, Result};

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Browser clients connect from arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chatbot", post(handlers::chat))
        .route("/chatbot/stream", get(handlers::chat_stream))
        .route("/chatbot/stream-v2", get(handlers::chat_stream_v2))
        .route("/transcribe", post(handlers::transcribe))
        .route("/voice/chat", get(ws::voice_chat))
        .route(
            "/conversations/{session_id}",
            get(handlers::get_conversation).delete(handlers::clear_conversation),
        )
        .route("/health", get(handlers::health))
        .route("/info", get(handlers::info_endpoint))
        // Audio uploads dominate request size.
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
pub async fn start_server(state: AppState) -> Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.general.host, state.config.general.port
    );
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| ParleyError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
