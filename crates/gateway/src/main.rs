//! Gateway service entry point.
//!
//! Fire alert gateway: webhook ingress, real-time hub and read API.

use anyhow::{Context, Result};
use gateway::{create_router, AppState, GatewayConfig, StoreBackend};
use metrics_exporter_prometheus::PrometheusBuilder;
use sensor_store::{MemoryStore, RedisStore, SharedStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Gateway service");

    let config = GatewayConfig::from_env();
    config.log_summary();

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()
        .context("Failed to start Prometheus exporter")?;
    info!("Prometheus metrics server started on port {}", config.metrics_port);

    let store: SharedStore = match config.store_backend {
        StoreBackend::Redis => {
            info!("Using Redis sensor store at {}", config.redis_url);
            Arc::new(RedisStore::new(&config.redis_url).context("Invalid REDIS_URL")?)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory sensor store; readings are not persisted");
            Arc::new(MemoryStore::new())
        }
    };

    // Create application state
    let state = Arc::new(AppState::new(&config, store)?);

    // Create HTTP router
    let app = create_router(state);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    gateway::ws_server::log_endpoints(&addr);

    // Run server with graceful shutdown
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
