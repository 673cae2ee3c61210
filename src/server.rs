//! Liveness endpoint
//!
//! Runs on its own task and never touches ledger state.

use std::net::SocketAddr;

use axum::{response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

/// Create the liveness router
pub fn create_router() -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/health", get(health))
}

/// Static alive indicator
pub async fn alive() -> impl IntoResponse {
    "alive"
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// Bind `addr` and serve the liveness router until the process exits.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener).await
}

/// Serve on an already bound listener.
pub async fn serve_on(listener: TcpListener) -> std::io::Result<()> {
    info!("Liveness endpoint listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_router()).await
}
