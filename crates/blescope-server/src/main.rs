//! # blescope-server
//!
//! HTTP server for the blescope BLE inspector.
//!
//! This binary provides:
//! - REST API over the live device catalog, decoding and GATT access
//! - Server-Sent Events for catalog, settings and characteristic updates
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, in-memory radio with demo devices
//! cargo run --package blescope-server
//!
//! # Linux with BlueZ
//! cargo run --package blescope-server --features bluetooth
//! ```
//!
//! The config file defaults to the platform config directory; override it
//! with `BLESCOPE_CONFIG=/path/to/config.toml`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use blescope_core::{default_config_path, Config};
use blescope_server::api::create_router;
use blescope_server::logging;
use blescope_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Environment variable naming the config file.
const CONFIG_PATH_ENV: &str = "BLESCOPE_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(default_config_path, PathBuf::from);
    let config = Config::load_or_default(&config_path)?;

    logging::init(config.server.production)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting blescope-server"
    );

    let state = AppState::from_config(config).await?;
    let preload = state.names.spawn_preload(state.config.names.sources());

    let mode = state.config.scan.scan_mode(None);
    if let Err(e) = state.radio.start_scan(mode).await {
        warn!(error = %e, "initial scan failed to start; use POST /api/scan/start to retry");
    }

    let listener =
        TcpListener::bind((state.config.server.host.as_str(), state.config.server.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    preload.abort();
    if let Err(e) = state.radio.stop_scan().await {
        warn!(error = %e, "failed to stop scan");
    }
    state.monitor.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
