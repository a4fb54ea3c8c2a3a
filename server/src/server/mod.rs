//! HTTP and WebSocket surface

pub mod routes;
pub mod websocket;

use crate::run::RunController;
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::run_routes;
pub use websocket::ws_handler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: RunController,
    pub started_at: Arc<Instant>,
}

impl AppState {
    pub fn new(controller: RunController) -> Self {
        Self {
            controller,
            started_at: Arc::new(Instant::now()),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    /// Server uptime in seconds
    uptime_seconds: u64,
    /// Server version
    version: &'static str,
    /// Runs still executing
    active_runs: usize,
    /// Runs still held in the registry
    known_runs: usize,
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let registry = state.controller.registry();
    Json(MetricsResponse {
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
        active_runs: registry.active_count(),
        known_runs: registry.len(),
    })
}

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws/runs/:id", get(ws_handler))
        .nest("/api", run_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
