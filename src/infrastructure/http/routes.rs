//! Route handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::dto::{CreateTaskRequest, CreateTaskResponse, ErrorResponse, HealthResponse, ServiceInfo};
use super::server::AppState;
use crate::domain::models::Task;
use crate::services::SubmitError;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal(err: impl std::fmt::Display) -> ApiError {
    error!(error = %err, "Request failed on backend error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(err.to_string())),
    )
}

pub async fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: env!("CARGO_PKG_NAME").to_string(),
        status: "running".to_string(),
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<CreateTaskResponse>, ApiError> {
    match state.task_service.submit(req.goal, req.idempotency_key).await {
        Ok(outcome) => Ok(Json(CreateTaskResponse::from(outcome.task()))),
        Err(SubmitError::ValidationFailed(msg)) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(msg)),
        )),
        Err(e) => Err(internal(e)),
    }
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    match state.task_service.get(task_id).await {
        Ok(Some(task)) => Ok(Json(task)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("not found")),
        )),
        Err(e) => Err(internal(e)),
    }
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
        .into_response()
}
