//! `serve`: HTTP API plus worker until Ctrl-C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::models::Config;
use crate::infrastructure::http::{self, AppState};
use crate::infrastructure::setup::Components;

pub async fn execute(config: Config) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind))?;

    let components = Components::build(&config).await?;
    let mut worker = components.worker(&config);
    let mut worker_stopped = worker.subscribe_shutdown();
    worker.start()?;

    let router = http::router(AppState {
        task_service: components.task_service(),
        metrics: Arc::clone(&components.metrics),
    });

    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
            _ = worker_stopped.recv() => warn!("Worker stopped, shutting down HTTP API"),
        }
    };

    let served = http::serve(addr, router, shutdown).await;
    let stopped = worker.stop().await;
    served?;
    stopped
}
