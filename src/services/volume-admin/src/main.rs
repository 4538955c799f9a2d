//! Volume Admin Server
//!
//! Main entry point for the StorCore volume administration API.
//! Serves the microversioned service and cluster lifecycle endpoints and
//! the internal heartbeat endpoint backend processes report to.

use anyhow::{Context, Result};
use clap::Parser;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use volume_admin::{
    config::{Args, VolumeAdminConfig},
    handlers::{create_router, AppState},
    lifecycle::{LifecycleController, LogControl},
    models::LogLevel,
    rpc::HttpBackendRpc,
    store::InMemoryStore,
};

/// Telemetry and observability setup
mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    use volume_admin::config::VolumeAdminConfig;

    /// Initialize tracing and logging
    pub fn init_tracing(config: &VolumeAdminConfig) -> Result<()> {
        let env_filter = EnvFilter::try_new(&config.logging.level)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = match config.logging.format.as_str() {
            "json" => fmt::layer().json().boxed(),
            _ => fmt::layer().pretty().boxed(),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();

        Ok(())
    }
}

/// Graceful shutdown handling
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let config = Arc::new(VolumeAdminConfig::load(&args)?);

    // Initialize telemetry
    telemetry::init_tracing(&config)?;

    info!(
        "Starting StorCore Volume Admin Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Configuration loaded from: {:?}", args.config);

    // Initialize the lifecycle controller and its collaborators
    let store = Arc::new(InMemoryStore::new());
    let rpc = Arc::new(
        HttpBackendRpc::new(&config.rpc).context("Failed to initialize backend RPC client")?,
    );
    let root_level =
        LogLevel::from_str(&config.logging.level).unwrap_or(LogLevel::Info);
    let logs = Arc::new(LogControl::new(root_level));
    let controller = Arc::new(LifecycleController::new(
        store,
        rpc,
        logs,
        config.lifecycle.clone(),
    ));

    // Create application state and router
    let app_state = AppState {
        config: Arc::clone(&config),
        controller,
    };
    let app = create_router(app_state);

    // Start the HTTP server
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to server address")?;

    info!("Volume Admin Server listening on {}", addr);
    info!("Health endpoint: http://{}/health", addr);
    info!("Services API: http://{}/v3/os-services", addr);
    info!("Clusters API: http://{}/v3/clusters", addr);

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed to start")?;

    info!("Volume Admin Server shutdown complete");
    Ok(())
}
