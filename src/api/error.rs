use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ConcordError;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }
}

impl From<ConcordError> for ApiError {
    fn from(err: ConcordError) -> Self {
        let (status, error) = match &err {
            ConcordError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            ConcordError::DuplicateAgent(_) => (StatusCode::CONFLICT, "duplicate_agent"),
            ConcordError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ConcordError::UnknownStrategy(_) => (StatusCode::BAD_REQUEST, "unknown_strategy"),
            ConcordError::LockContention { .. } => (StatusCode::LOCKED, "lock_contention"),
            ConcordError::System { .. } => {
                log::error!("Request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "system")
            }
        };
        Self::new(status, error, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}
