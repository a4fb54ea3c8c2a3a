//! Common Test Utilities for Integration Tests
//!
//! Shared helpers: a mock target API on an ephemeral port and the app router
//! wired to a controller with known tokens.

#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    routing::post,
};
use loadrun_server::config::RunSettings;
use loadrun_server::run::{Role, RunController, RunEntry, RunRegistry, StaticTokenAuthorizer};
use loadrun_server::{AppState, app};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const VIEWER_TOKEN: &str = "test-viewer-token";

/// Target API: login hands out a token, every other path answers `status`.
/// Every response, login included, is delayed by `latency`.
pub fn mock_target(latency: Duration, status: StatusCode) -> Router {
    Router::new()
        .route(
            "/auth/login",
            post(move || async move {
                tokio::time::sleep(latency).await;
                Json(json!({"token": "mock-session"}))
            }),
        )
        .fallback(post(move || async move {
            tokio::time::sleep(latency).await;
            (status, "mock response")
        }))
}

/// Serve a router on 127.0.0.1 with an ephemeral port
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn spawn_target(latency: Duration, status: StatusCode) -> String {
    format!("http://{}", serve(mock_target(latency, status)).await)
}

/// Run settings suited to tests: fast waves, progress after every user
pub fn test_settings() -> RunSettings {
    let mut settings = RunSettings::default();
    settings.probe_timeout = Duration::from_secs(5);
    settings.waves.pause = Duration::from_millis(10);
    settings.progress_every_vus = 1;
    settings
}

/// Create a test application router with state
pub fn create_test_app_with_state(settings: RunSettings) -> (Router, AppState) {
    let authorizer = StaticTokenAuthorizer::new()
        .with_token(ADMIN_TOKEN, Role::Admin)
        .with_token(VIEWER_TOKEN, Role::Viewer);
    let controller = RunController::new(
        settings,
        Arc::new(authorizer),
        Arc::new(RunRegistry::default()),
    )
    .unwrap();
    let state = AppState::new(controller);
    (app(state.clone()), state)
}

/// Create a test application router with all routes configured
pub fn create_test_app() -> Router {
    create_test_app_with_state(test_settings()).0
}

pub fn run_body(
    base_url: &str,
    vus: u64,
    requests_per_user: u64,
    scenario: &str,
    mode: &str,
) -> Value {
    json!({
        "baseUrl": base_url,
        "vus": vus,
        "requestsPerUser": requests_per_user,
        "delayMs": 0,
        "scenario": scenario,
        "mode": mode,
    })
}

pub fn start_request(body: impl Into<Body>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/runs")
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(body.into()).unwrap()
}

pub fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub async fn read_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Poll until the run reaches a terminal phase
pub async fn wait_until_finished(state: &AppState, run_id: &str) -> Arc<RunEntry> {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let entry = state.controller.registry().get(run_id).unwrap();
        if entry.phase().is_terminal() {
            return entry;
        }
        assert!(Instant::now() < deadline, "run {} did not finish", run_id);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
