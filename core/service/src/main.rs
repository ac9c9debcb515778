//! Quicknotes HTTP service
//!
//! Usage:
//!   cargo run --bin quicknotes [--db-path <path>] [--bind <addr>]
//!
//! Settings not given as flags come from the environment (a `.env` file is
//! loaded when present): NOTES_DB_PATH, NOTES_BIND_ADDR,
//! NOTES_DEFAULT_LANGUAGE, LLM_BASE_URL, LLM_MODEL, LLM_API_KEY or
//! GITHUB_TOKEN, LLM_TEMPERATURE, LLM_TOP_P, LLM_TIMEOUT_SECS.

use anyhow::{Context, Result};
use clap::Parser;
use quicknotes_assistant::{CompletionClient, OpenAICompatibleClient};
use quicknotes_service::{build_router, AppState, Database, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quicknotes")]
#[command(about = "Notes service with manual ordering and LLM-assisted note creation")]
struct Args {
    /// Path to SQLite database file
    #[arg(long, short)]
    db_path: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:5001
    #[arg(long, short)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Quicknotes Service v{}", env!("CARGO_PKG_VERSION"));
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let args = Args::parse();

    let mut config = ServiceConfig::from_env().context("Invalid configuration")?;
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    // Create directory if it doesn't exist
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db = Database::new(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    info!("Database initialized at: {}", config.db_path.display());

    if config.llm.api_key.is_none() {
        warn!("No LLM_API_KEY or GITHUB_TOKEN set; generate and translate will likely fail");
    }
    info!("LLM endpoint: {} (model {})", config.llm.base_url, config.llm.model);

    let client: Arc<dyn CompletionClient> = Arc::new(OpenAICompatibleClient::new(config.llm)?);
    let state = AppState::new(db, client, config.default_language);

    let app = build_router(state);

    // Start server
    info!("Starting HTTP server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
