use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::errors::BackupError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, msg) = match &self {
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, s),
            AppError::Unauthorized(s) => (StatusCode::UNAUTHORIZED, s),
            AppError::Forbidden(s) => (StatusCode::FORBIDDEN, s),
            AppError::NotFound(s) => (StatusCode::NOT_FOUND, s),
            AppError::Internal(s) => (StatusCode::INTERNAL_SERVER_ERROR, s),
        };
        (code, Json(ErrBody { error: msg.clone() })).into_response()
    }
}

impl From<BackupError> for AppError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::Permission { message } => AppError::Forbidden(message),
            BackupError::Validation { message, .. } => AppError::BadRequest(message),
            BackupError::InvalidPath { message } => AppError::BadRequest(message),
            BackupError::OutsideSandbox => AppError::BadRequest(err.to_string()),
            BackupError::NotFound { .. } => AppError::NotFound(err.to_string()),
            BackupError::Config { message } => {
                error!(%message, "configuration error surfaced to caller");
                AppError::Internal(format!("Configuration error: {message}"))
            }
            other => {
                error!(error = %other, "backup operation failed");
                AppError::Internal(other.to_string())
            }
        }
    }
}
