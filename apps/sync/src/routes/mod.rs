pub mod health;
pub mod sync;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/sync", post(sync::handle_trigger_sync))
        .route("/api/v1/sync/history", get(sync::handle_sync_history))
        .route("/api/v1/sync/status", get(sync::handle_sync_status))
        .with_state(state)
}
