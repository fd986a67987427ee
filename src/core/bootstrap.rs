use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use super::config::ServerConfig;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Loads `.env` when present. A missing file is not an error.
pub fn init_env() {
    if let Err(err) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", err);
    }
}

pub async fn serve(service_name: &str, app: Router, server: &ServerConfig) -> Result<()> {
    let app = app.layer(TraceLayer::new_for_http());
    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("{} listening on {}", service_name, addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server exited with an error")?;
    tracing::info!("{} stopped", service_name);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
