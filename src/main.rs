mod advisor;
mod classify;
mod config;
mod dns;
mod engine;
mod error;
mod health;
mod multi_location;
mod probe;
mod roster;
mod routes;
mod server;
mod state;

use clap::Parser;
use std::sync::Arc;
use tracing::info;

use config::{CliArgs, ProbeConfig};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "domainprobe=info,tower_http=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    info!("Starting domainprobe v{}", env!("CARGO_PKG_VERSION"));

    let config = ProbeConfig::from_args(args);
    let bind = config.bind.clone();
    let port = config.port;

    let state = Arc::new(AppState::new(config)?);

    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, port)).await?;
    info!("domainprobe listening on http://{}:{}", bind, port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("domainprobe shutting down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal");
}
