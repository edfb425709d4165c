//! # searchit-server
//!
//! HTTP server for Search It.
//!
//! This binary provides:
//! - REST API for tracked objects, beacon pairing and proximity monitoring
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, simulated beacon
//! cargo run --package searchit-server
//!
//! # On a Linux host with BlueZ
//! cargo run --package searchit-server --features bluetooth
//! ```
//!
//! The config file is read from `SEARCHIT_CONFIG` if set, otherwise from the
//! platform config directory. `SEARCHIT__SECTION__KEY` variables override it.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use searchit_core::{default_config_path, Config};
use searchit_server::api::create_router;
use searchit_server::logging;
use searchit_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};

const CONFIG_ENV: &str = "SEARCHIT_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .or_else(default_config_path)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load_or_default(&config_path)?;

    logging::init(config.server.production)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting searchit-server"
    );

    let addr = config.bind_address();
    let state = Arc::new(AppState::new(config).await?);
    let app = create_router(Arc::clone(&state));

    let listener = TcpListener::bind(addr.as_str()).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Nothing may keep the beacon connected once the server is gone.
    state.session().end().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT, initiating shutdown..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown..."),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => warn!(error = %e, "cannot install signal handlers"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl+C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, initiating shutdown...");
}
