use super::auth::AuthError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run controller errors
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Run not found: {0}")]
    NotFound(String),

    #[error("Run already finished: {0}")]
    AlreadyFinished(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("Run aborted: {0}")]
    Aborted(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct RunErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<RunError> for RunErrorResponse {
    fn from(e: RunError) -> Self {
        let code = match &e {
            RunError::Auth(AuthError::Forbidden(_)) => "forbidden",
            RunError::Auth(_) => "unauthorized",
            RunError::InvalidConfig(_) => "invalid_config",
            RunError::NotFound(_) => "not_found",
            RunError::AlreadyFinished(_) => "conflict",
            RunError::Cancelled | RunError::Aborted(_) => "internal",
        };
        Self {
            error: e.to_string(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for RunErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "invalid_config" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for RunError {
    fn into_response(self) -> Response {
        RunErrorResponse::from(self).into_response()
    }
}
