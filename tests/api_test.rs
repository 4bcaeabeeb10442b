//! HTTP API tests against the router, without a listener.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use common::Harness;
use llm_task_runner::infrastructure::http::{router, AppState};
use llm_task_runner::services::TaskService;

fn app(harness: &Harness) -> Router {
    router(AppState {
        task_service: Arc::new(TaskService::new(
            harness.store.clone(),
            harness.queue.clone(),
            harness.metrics.clone(),
        )),
        metrics: harness.metrics.clone(),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_create_then_fetch_task() {
    let mut harness = Harness::new();
    let app = app(&harness);
    harness.worker.start().unwrap();

    let (status, body) = send(&app, post_json("/tasks", json!({"goal": "calculate: 6*7"}))).await;
    assert_eq!(status, StatusCode::OK);
    let created: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(created["status"], "queued");
    let task_id = created["task_id"].as_str().unwrap().to_string();

    harness.wait_terminal(task_id.parse().unwrap()).await;
    harness.worker.stop().await.unwrap();

    let (status, body) = send(&app, get(&format!("/tasks/{task_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let task: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(task["status"], "succeeded");
    assert_eq!(task["steps"][1]["output"]["value"], json!(42.0));
    assert_eq!(task["steps"][0]["kind"], "plan");
}

#[tokio::test]
async fn test_idempotent_create_returns_same_id() {
    let harness = Harness::new();
    let app = app(&harness);
    let request = json!({"goal": "calculate: 1+1", "idempotency_key": "abc"});

    let (_, first) = send(&app, post_json("/tasks", request.clone())).await;
    let (_, second) = send(&app, post_json("/tasks", request)).await;

    let first: Value = serde_json::from_slice(&first).unwrap();
    let second: Value = serde_json::from_slice(&second).unwrap();
    assert_eq!(first["task_id"], second["task_id"]);
    assert_eq!(common::queue_len(harness.queue.as_ref()).await, 1);
}

#[tokio::test]
async fn test_invalid_goal_is_unprocessable() {
    let harness = Harness::new();
    let app = app(&harness);

    let (status, body) = send(&app, post_json("/tasks", json!({"goal": ""}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("goal"));

    let long_key = "k".repeat(201);
    let (status, _) = send(
        &app,
        post_json("/tasks", json!({"goal": "ok", "idempotency_key": long_key})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(common::queue_len(harness.queue.as_ref()).await, 0);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let harness = Harness::new();
    let app = app(&harness);

    let (status, body) = send(&app, get(&format!("/tasks/{}", uuid::Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"error": "not found"}));
}

#[tokio::test]
async fn test_metrics_exposition() {
    let harness = Harness::new();
    let app = app(&harness);
    send(&app, post_json("/tasks", json!({"goal": "calculate: 1"}))).await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("# TYPE llm_task_runner_task_created counter\n"));
    assert!(text.contains("llm_task_runner_task_created 1\n"));
    assert!(text.contains("llm_task_runner_tasks_running 0\n"));
}

#[tokio::test]
async fn test_health_and_index() {
    let harness = Harness::new();
    let app = app(&harness);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"ok": true}));

    let (_, body) = send(&app, get("/")).await;
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({"service": "llm-task-runner", "status": "running"})
    );
}
