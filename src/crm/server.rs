use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use super::commands::CommandBus;
use super::db::{CrmDb, DbHandle};
use super::listing::SortKey;
use super::service::ProspectService;
use super::ws;

/// Configuration for the prospect server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub default_sort: SortKey,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            db_path: PathBuf::from(".prospector/prospector.db"),
            dev_mode: false,
            default_sort: SortKey::default(),
        }
    }
}

/// Build the full application router with API and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Open (creating if needed) the SQLite database at `path`.
pub fn open_database(path: &std::path::Path) -> Result<DbHandle> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = CrmDb::new(path).context("Failed to initialize prospect database")?;
    Ok(DbHandle::new(db))
}

pub fn build_state(db: DbHandle, default_sort: SortKey) -> Arc<AppState> {
    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    Arc::new(AppState {
        service: ProspectService::new(Arc::new(db)),
        ws_tx,
        commands: CommandBus::new(),
        default_sort,
    })
}

/// Start the prospect server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = open_database(&config.db_path)?;
    let state = build_state(db, config.default_sort);

    let mut app = build_router(state);

    // Dev mode serves a separately hosted UI.
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, db = %config.db_path.display(), "Prospector listening");
    println!("Prospector running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
