//! Keep-alive endpoint for external uptime probes.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

const ALIVE: &str = "I am alive!";

async fn alive() -> &'static str {
    ALIVE
}

pub fn routes() -> Router {
    Router::new().route("/", get(alive))
}

pub async fn serve(port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind liveness endpoint to {addr}"))?;

    info!("Liveness endpoint listening on {}", addr);
    axum::serve(listener, routes())
        .await
        .context("Liveness server error")?;

    Ok(())
}
