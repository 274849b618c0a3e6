use anyhow::Context;
use swasthya_service::{ServiceConfig, create_app, init_tracing};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = ServiceConfig::from_env();
    for key in config.missing_credentials() {
        warn!("{key} is not set; requests routed to that provider will fail");
    }

    let bind_address = config.bind_address();
    let app = create_app(config).context("failed to build provider clients")?;
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    let addr = listener.local_addr()?;

    info!("Swasthya service listening on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
