//! HTTP routes for run control

use crate::run::{RunConfig, RunErrorResponse, RunSummary, bearer_token};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::Serialize;
use tracing::warn;

use super::AppState;

/// Response for POST /api/runs
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub success: bool,
    pub run_id: String,
    pub message: String,
    /// Values after clamping
    pub effective: RunConfig,
}

/// Response for DELETE /api/runs/:id
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRunResponse {
    pub run_id: String,
    pub cancelled: bool,
}

/// Create run API routes
pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/runs", post(start_run))
        .route("/runs/:id", get(get_run).delete(cancel_run))
}

/// POST /api/runs - Start a load test
///
/// The body is parsed only after the caller is authorized.
async fn start_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<StartRunResponse>), RunErrorResponse> {
    let started = state
        .controller
        .start(bearer_token(&headers), &body)
        .await
        .map_err(|e| {
            warn!("Run rejected: {}", e);
            RunErrorResponse::from(e)
        })?;

    let message = if started.config.clamped {
        "Run started with clamped limits".to_string()
    } else {
        "Run started".to_string()
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            success: true,
            run_id: started.id,
            message,
            effective: started.config,
        }),
    ))
}

/// GET /api/runs/:id - Phase, config and latest progress or report
async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, RunErrorResponse> {
    state
        .controller
        .authorize_viewer(bearer_token(&headers))
        .await?;
    let entry = state.controller.registry().get(&id)?;
    Ok(Json(entry.summary()))
}

/// DELETE /api/runs/:id - Cancel a live run
async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<CancelRunResponse>), RunErrorResponse> {
    state
        .controller
        .cancel(bearer_token(&headers), &id)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelRunResponse {
            run_id: id,
            cancelled: true,
        }),
    ))
}
