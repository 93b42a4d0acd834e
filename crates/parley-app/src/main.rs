//! Parley application binary - composition root.
//!
//! Ties together all Parley crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open the SQLite stores (history + archive)
//! 3. Build the LLM client, tool registry, and orchestration engine
//! 4. Load the voice activity detector and transcription service
//! 5. Start the axum server (REST + SSE + WebSocket)
//!
//! Secrets come from the environment: OPENAI_API_KEY for completions and
//! transcription, SERPAPI_KEY (or SERP_API_KEY) and GNEWS_API_KEY for the
//! retrieval tools. Missing tool keys degrade those tools to soft errors
//! rather than preventing startup.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use parley_api::{routes, AppState};
use parley_chat::ChatOrchestrator;
use parley_core::config::ParleyConfig;
use parley_history::{
    ArchiveStore, Database, HistoryStore, SqliteArchiveStore, SqliteHistoryStore,
};
use parley_llm::{CompletionClient, OpenAiClient};
use parley_tools::{SearchProvider, SerpApiProvider, ToolRegistry};
use parley_transcribe::{TranscriptionService, WhisperApiService};
use parley_voice::{EnergyVad, VadModel, VoiceEndpointer};

use cli::CliArgs;

/// Expand ~ to the home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if let Some(rest) = data_dir.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(data_dir)
    }
}

fn env_key(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| std::env::var(n).ok())
        .filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first; the log level may come from it.
    let config_file = args.resolve_config_path();
    let mut config = ParleyConfig::load_or_default(&config_file);
    config.general.port = args.resolve_port(config.general.port);
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.general.log_level.clone())
            }),
        )
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage. A failure here is fatal; every turn persists through it.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    let db_path = data_dir.join("parley.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::new(Arc::clone(&db)));
    let archive: Arc<dyn ArchiveStore> = Arc::new(SqliteArchiveStore::new(Arc::clone(&db)));

    // LLM client.
    let openai_key = env_key(&["OPENAI_API_KEY"]);
    if openai_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; completion and transcription calls will fail");
    }
    let llm: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        openai_key.clone(),
    ));

    // Retrieval tools. Missing keys surface as per-call tool errors.
    let serp_key = env_key(&["SERPAPI_KEY", "SERP_API_KEY"]);
    let gnews_key = env_key(&["GNEWS_API_KEY"]);
    if serp_key.is_none() {
        tracing::warn!("SerpAPI key not set; search tools degraded");
    }
    if gnews_key.is_none() {
        tracing::warn!("GNews key not set; news tool degraded");
    }
    let provider: Arc<dyn SearchProvider> = Arc::new(SerpApiProvider::new(
        serp_key,
        gnews_key,
        config.tools.timeout_secs,
    ));
    let tools = Arc::new(ToolRegistry::new(provider, config.tools.clone()));

    // Orchestration engine.
    let orchestrator = ChatOrchestrator::new(
        llm,
        tools,
        Arc::clone(&history),
        Arc::clone(&archive),
        config.llm.clone(),
        config.history.clone(),
        config.stream.clone(),
    );

    // Voice pipeline.
    let vad = Arc::new(VadModel::loaded(Box::new(EnergyVad::new(
        config.voice.vad_threshold,
    ))));
    tracing::info!("Voice activity detector loaded");
    let transcriber: Arc<dyn TranscriptionService> = Arc::new(WhisperApiService::new(
        config.llm.base_url.clone(),
        config.llm.transcription_model.clone(),
        openai_key,
    ));
    let endpointer = VoiceEndpointer::new(vad, Arc::clone(&transcriber), config.voice.clone());

    let state = AppState::new(
        config,
        orchestrator,
        history,
        archive,
        endpointer,
        transcriber,
    );

    routes::start_server(state).await?;
    Ok(())
}
