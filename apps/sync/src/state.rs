use std::sync::Arc;

use crate::sync::history::HistoryStore;
use crate::sync::scheduler::SingleFlight;
use crate::sync::sink::InteractionSink;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Same guard the timer loop uses, so HTTP triggers never overlap a scheduled pass.
    pub runner: SingleFlight,
    pub history: Arc<dyn HistoryStore>,
    pub sink: Arc<dyn InteractionSink>,
}
