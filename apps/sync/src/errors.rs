use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::sync::history::HistoryError;
use crate::sync::orchestrator::SyncError;
use crate::sync::scheduler::TriggerError;
use crate::sync::sink::SinkError;

/// Error type of the HTTP surface.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Sync failed: {0}")]
    SyncFailed(#[from] SyncError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<TriggerError> for AppError {
    fn from(e: TriggerError) -> Self {
        match e {
            TriggerError::AlreadyRunning => {
                AppError::Conflict(TriggerError::AlreadyRunning.to_string())
            }
            TriggerError::Sync(e) => AppError::SyncFailed(e),
        }
    }
}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<SinkError> for AppError {
    fn from(e: SinkError) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "SYNC_IN_PROGRESS", msg.clone()),
            AppError::SyncFailed(e) => {
                tracing::error!("Sync failed: {e}");
                (StatusCode::BAD_GATEWAY, "SYNC_FAILED", e.to_string())
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
        };

        let mut body = json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        if let AppError::SyncFailed(SyncError::PartialWrite(report)) = &self {
            body["report"] = serde_json::to_value(report).unwrap_or_default();
        }

        (status, Json(body)).into_response()
    }
}
