//! Alert delivery. The sync core only sees the `AlertNotifier` capability;
//! which transport delivers the alert is decided at startup.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::models::sync_history::SyncHistory;

pub mod message;
pub mod resend;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// `failures` is ordered most recent first.
    async fn send_failure_alert(&self, failures: &[SyncHistory]) -> Result<(), NotifyError>;
}

/// Used when no e-mail transport is configured: the alert only reaches the logs.
pub struct LogNotifier;

#[async_trait]
impl AlertNotifier for LogNotifier {
    async fn send_failure_alert(&self, failures: &[SyncHistory]) -> Result<(), NotifyError> {
        let latest = failures
            .first()
            .and_then(|f| f.error_message.as_deref())
            .unwrap_or("unknown error");
        warn!(
            consecutive_failures = failures.len(),
            latest_error = latest,
            "sync failure alert (no e-mail transport configured)"
        );
        Ok(())
    }
}
