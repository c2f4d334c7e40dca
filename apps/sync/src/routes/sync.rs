use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::sync_history::SyncHistory;
use crate::state::AppState;
use crate::sync::orchestrator::SyncReport;

const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct SyncStatusResponse {
    pub running: bool,
    pub high_water_mark: Option<DateTime<Utc>>,
    pub record_count: i64,
}

/// POST /api/v1/sync
/// Entry point for external schedulers. Runs one pass and returns its report.
pub async fn handle_trigger_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncReport>, AppError> {
    let report = state.runner.trigger().await?;
    Ok(Json(report))
}

/// GET /api/v1/sync/history
pub async fn handle_sync_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<SyncHistory>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }
    Ok(Json(state.history.recent(limit).await?))
}

/// GET /api/v1/sync/status
pub async fn handle_sync_status(
    State(state): State<AppState>,
) -> Result<Json<SyncStatusResponse>, AppError> {
    Ok(Json(SyncStatusResponse {
        running: state.runner.is_running(),
        high_water_mark: state.sink.high_water_mark().await?,
        record_count: state.sink.count().await?,
    }))
}
