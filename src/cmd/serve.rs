//! HTTP server command — `prospector serve`.

use anyhow::Result;
use std::path::PathBuf;

use prospector::crm::server;
use prospector::prospector_config::ProspectorConfig;

pub async fn cmd_serve(
    config: &ProspectorConfig,
    port: Option<u16>,
    host: Option<String>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let mut server_config = config.server_config();
    if let Some(port) = port {
        server_config.port = port;
    }
    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(db_path) = db_path {
        server_config.db_path = db_path;
    }
    // Dev mode listens on all interfaces for a containerized UI.
    if dev {
        server_config.dev_mode = true;
        server_config.host = "0.0.0.0".to_string();
    }

    server::start_server(server_config).await
}
