//! Operational HTTP surface — process liveness and pipeline status.
//!
//! Deliberately tiny: one health route. The pipeline itself has no inbound
//! HTTP interface; faxes arrive through the poller.

pub mod health;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiContext {
    /// Live flag owned by the pipeline worker.
    pub worker_running: Arc<AtomicBool>,
}

pub fn router(ctx: ApiContext) -> Router {
    Router::new().route("/health", get(health::check)).with_state(ctx)
}

/// Bind and serve the health surface until the process exits.
pub async fn serve(ctx: ApiContext, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "Health server listening");
    axum::serve(listener, router(ctx)).await
}
