//! Router construction and the listener.

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::routes;
use crate::services::{Metrics, TaskService};

/// Shared state handed to every handler.
pub struct AppState {
    pub task_service: Arc<TaskService>,
    pub metrics: Arc<Metrics>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/tasks", post(routes::create_task))
        .route("/tasks/{task_id}", get(routes::get_task))
        .route("/metrics", get(routes::metrics))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Serve `router` on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;
    Ok(())
}
