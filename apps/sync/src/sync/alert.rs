//! Alert Trigger: fires when the last `threshold` runs all failed.
//!
//! Level-triggered and stateless. Each call re-reads history and decides from
//! scratch, so calling it twice against the same history alerts twice. The
//! orchestrator calls it at most once per run.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::models::sync_history::SyncHistory;
use crate::notify::AlertNotifier;
use crate::sync::history::HistoryStore;

pub const DEFAULT_FAILURE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    /// Fewer than `threshold` runs recorded so far.
    InsufficientHistory { found: usize, threshold: usize },
    /// At least one of the last `threshold` runs did not fail.
    Healthy { failed: usize, threshold: usize },
    /// All of the last `threshold` runs failed; rows are most recent first.
    Alert(Vec<SyncHistory>),
}

/// `recent` must already be ordered most recent first and limited to
/// `threshold` rows.
pub fn evaluate(recent: Vec<SyncHistory>, threshold: usize) -> AlertDecision {
    if recent.len() < threshold {
        return AlertDecision::InsufficientHistory {
            found: recent.len(),
            threshold,
        };
    }
    let failed = recent.iter().filter(|h| h.is_failed()).count();
    if failed < recent.len() {
        return AlertDecision::Healthy { failed, threshold };
    }
    AlertDecision::Alert(recent)
}

#[derive(Clone)]
pub struct AlertTrigger {
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn AlertNotifier>,
    threshold: usize,
}

impl AlertTrigger {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn AlertNotifier>,
        threshold: usize,
    ) -> Self {
        Self {
            history,
            notifier,
            threshold: threshold.max(1),
        }
    }

    /// Evaluates the failure streak and dispatches at most one alert.
    /// Returns whether an alert was dispatched successfully. Errors are
    /// logged, never propagated.
    pub async fn check(&self) -> bool {
        let recent = match self.history.recent(self.threshold as i64).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "failed to read sync history for alert check");
                return false;
            }
        };

        match evaluate(recent, self.threshold) {
            AlertDecision::InsufficientHistory { found, threshold } => {
                info!(found, threshold, "not enough sync history for alert check");
                false
            }
            AlertDecision::Healthy { failed, threshold } => {
                info!(failed, threshold, "recent runs are not all failures, no alert");
                false
            }
            AlertDecision::Alert(failures) => {
                warn!(
                    consecutive_failures = failures.len(),
                    "consecutive sync failures detected, sending alert"
                );
                match self.notifier.send_failure_alert(&failures).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(error = %e, "failed to send failure alert");
                        false
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Captures every alert payload it is handed.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Vec<SyncHistory>>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AlertNotifier for RecordingNotifier {
        async fn send_failure_alert(&self, failures: &[SyncHistory]) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(failures.to_vec());
            if self.fail {
                return Err(NotifyError::Api {
                    status: 500,
                    message: "mail server down".to_string(),
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::RecordingNotifier;
    use super::*;
    use crate::models::sync_history::SyncStatus::{self, Failed, Partial, Success};
    use crate::sync::history::fakes::MemoryHistory;
    use chrono::{Duration, Utc};

    /// Rows are given oldest first, the way they would have been inserted.
    fn history(statuses: &[SyncStatus]) -> Vec<SyncHistory> {
        let start = Utc::now() - Duration::hours(statuses.len() as i64);
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| SyncHistory {
                sync_time: start + Duration::hours(i as i64),
                records_checked: i as i32,
                records_inserted: 0,
                records_updated: 0,
                records_failed: 0,
                records_skipped: 0,
                status: *status,
                error_message: Some(format!("run {i}")),
            })
            .collect()
    }

    fn trigger(rows: Vec<SyncHistory>) -> (AlertTrigger, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let trigger = AlertTrigger::new(
            Arc::new(MemoryHistory::with_rows(rows)),
            notifier.clone(),
            3,
        );
        (trigger, notifier)
    }

    #[tokio::test]
    async fn test_threshold_failures_fire_alert() {
        let (trigger, notifier) = trigger(history(&[Success, Failed, Failed, Failed]));
        assert!(trigger.check().await);
        assert_eq!(notifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_one_success_in_window_suppresses_alert() {
        let (trigger, notifier) = trigger(history(&[Failed, Failed, Success, Failed, Failed]));
        assert!(!trigger.check().await);
        assert_eq!(notifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_partial_is_not_a_failure() {
        let (trigger, notifier) = trigger(history(&[Failed, Partial, Failed]));
        assert!(!trigger.check().await);
        assert_eq!(notifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_history_does_not_fire() {
        let (trigger, notifier) = trigger(history(&[Failed, Failed]));
        assert!(!trigger.check().await);
        assert_eq!(notifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_payload_is_most_recent_first() {
        let (trigger, notifier) = trigger(history(&[Failed, Failed, Failed, Failed]));
        trigger.check().await;
        let sent = notifier.sent.lock().unwrap();
        let messages: Vec<_> = sent[0]
            .iter()
            .map(|h| h.error_message.clone().unwrap())
            .collect();
        assert_eq!(messages, vec!["run 3", "run 2", "run 1"]);
    }

    #[tokio::test]
    async fn test_reevaluation_fires_again() {
        let (trigger, notifier) = trigger(history(&[Failed, Failed, Failed]));
        trigger.check().await;
        trigger.check().await;
        assert_eq!(notifier.calls(), 2, "level-triggered: no memory of prior alerts");
    }

    #[tokio::test]
    async fn test_dispatch_error_is_absorbed() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let trigger = AlertTrigger::new(
            Arc::new(MemoryHistory::with_rows(history(&[Failed, Failed, Failed]))),
            notifier.clone(),
            3,
        );
        assert!(!trigger.check().await);
        assert_eq!(notifier.calls(), 1);
    }

    #[test]
    fn test_evaluate_reports_counts() {
        let recent: Vec<_> = history(&[Failed, Success, Failed]).into_iter().rev().collect();
        assert_eq!(
            evaluate(recent, 3),
            AlertDecision::Healthy {
                failed: 2,
                threshold: 3
            }
        );
        assert_eq!(
            evaluate(vec![], 3),
            AlertDecision::InsufficientHistory {
                found: 0,
                threshold: 3
            }
        );
    }
}
