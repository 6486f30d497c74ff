//! # Kommo Bridge Main Entry Point
//!
//! Loads configuration, installs tracing and serves the webhook API.

use kommo_bridge::{config::ConfigLoader, server::run_server, telemetry::init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;
    init_tracing(&config)?;

    info!(profile = %config.profile, "configuration loaded");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(config = %redacted_json, "effective configuration");
    }

    run_server(config).await
}
