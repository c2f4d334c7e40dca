//! Orchestrator: one incremental synchronization pass.
//!
//! 1. read the high-water mark (max `last_synced`) once
//! 2. fetch every source record; a fetch error records a `failed` run,
//!    evaluates alerts and aborts
//! 3. keep the records changed since the mark
//! 4. transform them, dropping records without a customer name
//! 5. upsert in batches and record `success` or `partial`
//! 6. any failed batch evaluates alerts and fails the pass

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::airtable::{AirtableError, RecordSource};
use crate::models::sync_history::{SyncHistory, SyncStatus};
use crate::sync::alert::AlertTrigger;
use crate::sync::change_filter::select_changed;
use crate::sync::fields::FieldMap;
use crate::sync::history::{self, HistoryStore};
use crate::sync::sink::{upsert_in_batches, InteractionSink};
use crate::sync::transform::convert;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to fetch source records: {0}")]
    Fetch(#[from] AirtableError),

    #[error("{} records failed to sync", .0.records_failed)]
    PartialWrite(Box<SyncReport>),
}

/// Outcome of one pass, returned to callers and logged as the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub high_water_mark: Option<DateTime<Utc>>,
    pub records_checked: usize,
    pub records_changed: usize,
    pub records_skipped: usize,
    pub records_synced: usize,
    pub records_failed: usize,
    pub status: SyncStatus,
}

impl SyncReport {
    fn new(run_id: Uuid, high_water_mark: Option<DateTime<Utc>>) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            high_water_mark,
            records_checked: 0,
            records_changed: 0,
            records_skipped: 0,
            records_synced: 0,
            records_failed: 0,
            status: SyncStatus::Success,
        }
    }

    /// `records_updated` holds every written row: the upsert cannot tell
    /// inserts from updates, so `records_inserted` stays 0.
    fn to_history(&self) -> SyncHistory {
        let error_message = (self.records_failed > 0)
            .then(|| format!("{} records failed to sync", self.records_failed));
        SyncHistory {
            sync_time: Utc::now(),
            records_checked: clamp_count(self.records_checked),
            records_inserted: 0,
            records_updated: clamp_count(self.records_synced),
            records_failed: clamp_count(self.records_failed),
            records_skipped: clamp_count(self.records_skipped),
            status: self.status,
            error_message,
        }
    }
}

fn clamp_count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// All collaborators are injected so the pass can run against fakes.
pub struct SyncService {
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn InteractionSink>,
    history: Arc<dyn HistoryStore>,
    alerts: AlertTrigger,
    fields: FieldMap,
    batch_size: usize,
}

impl SyncService {
    pub fn new(
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn InteractionSink>,
        history: Arc<dyn HistoryStore>,
        alerts: AlertTrigger,
        fields: FieldMap,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            sink,
            history,
            alerts,
            fields,
            batch_size,
        }
    }

    /// Runs one pass. Callers must not run two passes concurrently; see
    /// `scheduler::SingleFlight`.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let run_id = Uuid::new_v4();
        self.run_pass(run_id)
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    /// An unreadable mark degrades to a full sync rather than failing the run.
    async fn high_water_mark(&self) -> Option<DateTime<Utc>> {
        match self.sink.high_water_mark().await {
            Ok(Some(mark)) => {
                info!(%mark, "syncing records changed after high-water mark");
                Some(mark)
            }
            Ok(None) => {
                warn!("no previous sync found, performing full sync");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to read high-water mark, performing full sync");
                None
            }
        }
    }

    async fn run_pass(&self, run_id: Uuid) -> Result<SyncReport, SyncError> {
        info!("incremental sync started");

        let high_water_mark = self.high_water_mark().await;
        let mut report = SyncReport::new(run_id, high_water_mark);

        let records = match self.source.fetch_all().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "source fetch failed, aborting run");
                history::record(
                    self.history.as_ref(),
                    &SyncHistory::failed(0, e.to_string()),
                )
                .await;
                self.alerts.check().await;
                return Err(SyncError::Fetch(e));
            }
        };
        report.records_checked = records.len();
        info!(fetched = records.len(), "fetched source records");

        let changed = select_changed(&records, high_water_mark, &self.fields);
        report.records_changed = changed.len();
        info!(changed = changed.len(), "filtered to modified/new records");

        if changed.is_empty() {
            info!("no changes detected, destination is up to date");
            history::record(self.history.as_ref(), &report.to_history()).await;
            return Ok(report);
        }

        let entities: Vec<_> = changed
            .iter()
            .filter_map(|record| convert(record, &self.fields))
            .collect();
        report.records_skipped = changed.len() - entities.len();
        info!(
            converted = entities.len(),
            skipped = report.records_skipped,
            "converted records"
        );

        if entities.is_empty() {
            info!("no valid records to sync");
            history::record(self.history.as_ref(), &report.to_history()).await;
            return Ok(report);
        }

        let outcome = upsert_in_batches(self.sink.as_ref(), &entities, self.batch_size).await;
        report.records_synced = outcome.success;
        report.records_failed = outcome.failed;
        report.status = if outcome.failed == 0 {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        };
        history::record(self.history.as_ref(), &report.to_history()).await;

        if outcome.failed > 0 {
            warn!(
                synced = outcome.success,
                failed = outcome.failed,
                "incremental sync finished with failed batches"
            );
            self.alerts.check().await;
            return Err(SyncError::PartialWrite(Box::new(report)));
        }

        info!(
            checked = report.records_checked,
            changed = report.records_changed,
            synced = report.records_synced,
            skipped = report.records_skipped,
            "incremental sync complete"
        );
        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{harness, harness_with_batch, StaticSource};
    use super::*;
    use crate::models::source::SourceRecord;
    use crate::sync::history::fakes::MemoryHistory;
    use crate::sync::sink::fakes::MemorySink;
    use chrono::Duration;
    use serde_json::{json, Value};

    fn record(id: &str, created: DateTime<Utc>, fields: Value) -> SourceRecord {
        SourceRecord {
            id: id.to_string(),
            fields: fields.as_object().cloned().unwrap(),
            created_time: created,
        }
    }

    fn customer(id: &str, name: &str) -> SourceRecord {
        record(
            id,
            Utc::now() - Duration::days(30),
            json!({ "客戶名稱+國家": [name] }),
        )
    }

    fn failed_rows(n: usize) -> Vec<SyncHistory> {
        (0..n)
            .map(|i| SyncHistory::failed(0, format!("earlier failure {i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_incremental_scenario() {
        let now = Utc::now();
        let fmt = |t: DateTime<Utc>| t.to_rfc3339();
        let records = vec![
            record(
                "R1",
                now - Duration::days(30),
                json!({ "客戶名稱+國家": ["Acme (US)"], "最後更新": fmt(now - Duration::days(1)) }),
            ),
            record(
                "R2",
                now - Duration::days(30),
                json!({ "類別": "Internal", "最後更新": fmt(now - Duration::days(5)) }),
            ),
            record(
                "R3",
                now - Duration::days(30),
                json!({ "客戶名稱+國家": ["Globex (DE)"], "最後更新": fmt(now) }),
            ),
        ];
        let h = harness(
            StaticSource::new(records),
            MemorySink::with_mark(Some(now - Duration::days(2))),
            MemoryHistory::default(),
        );

        let report = h.service.run().await.unwrap();
        assert_eq!(report.records_checked, 3);
        assert_eq!(report.records_changed, 2);
        assert_eq!(report.records_synced, 2);
        assert_eq!(report.status, SyncStatus::Success);
        assert_eq!(h.sink.stored_ids(), vec!["R1", "R3"]);

        let rows = h.history.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].records_checked, 3);
        assert_eq!(rows[0].records_updated, 2);
        assert_eq!(rows[0].records_failed, 0);
        assert_eq!(rows[0].status, SyncStatus::Success);
        assert_eq!(h.notifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_run_is_full_sync() {
        let h = harness(
            StaticSource::new(vec![customer("a", "A (US)"), customer("b", "B (US)")]),
            MemorySink::default(),
            MemoryHistory::default(),
        );
        let report = h.service.run().await.unwrap();
        assert_eq!(report.high_water_mark, None);
        assert_eq!(report.records_synced, 2);
    }

    #[tokio::test]
    async fn test_unreadable_mark_falls_back_to_full_sync() {
        let sink = MemorySink {
            fail_mark_read: true,
            ..Default::default()
        };
        let h = harness(
            StaticSource::new(vec![customer("a", "A (US)")]),
            sink,
            MemoryHistory::default(),
        );
        let report = h.service.run().await.unwrap();
        assert_eq!(report.records_synced, 1);
    }

    #[tokio::test]
    async fn test_no_changes_records_success_without_writes() {
        let h = harness(
            StaticSource::new(vec![customer("a", "A (US)")]),
            MemorySink::with_mark(Some(Utc::now())),
            MemoryHistory::default(),
        );
        let report = h.service.run().await.unwrap();
        assert_eq!(report.records_changed, 0);
        assert_eq!(h.sink.batches_seen(), 0);

        let rows = h.history.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, SyncStatus::Success);
        assert_eq!(rows[0].records_checked, 1);
        assert_eq!(rows[0].records_updated, 0);
    }

    #[tokio::test]
    async fn test_records_without_identity_are_skipped_and_counted() {
        let internal = record("internal", Utc::now(), json!({ "類別": "Memo" }));
        let h = harness(
            StaticSource::new(vec![internal, customer("ok", "Acme (US)")]),
            MemorySink::default(),
            MemoryHistory::default(),
        );
        let report = h.service.run().await.unwrap();
        assert_eq!(report.records_skipped, 1);
        assert_eq!(h.sink.stored_ids(), vec!["ok"]);
        assert_eq!(h.history.all()[0].records_skipped, 1);
    }

    #[tokio::test]
    async fn test_only_internal_records_is_success_without_writes() {
        let h = harness(
            StaticSource::new(vec![record("memo", Utc::now(), json!({}))]),
            MemorySink::default(),
            MemoryHistory::default(),
        );
        let report = h.service.run().await.unwrap();
        assert_eq!(report.status, SyncStatus::Success);
        assert_eq!(h.sink.batches_seen(), 0);
        assert_eq!(h.history.all()[0].records_skipped, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_records_failed_run() {
        let h = harness(
            StaticSource::failing(),
            MemorySink::default(),
            MemoryHistory::default(),
        );
        let err = h.service.run().await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch(_)));

        let rows = h.history.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, SyncStatus::Failed);
        assert!(rows[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("AUTHENTICATION_REQUIRED"));
        assert_eq!(h.sink.batches_seen(), 0);
        assert_eq!(h.notifier.calls(), 0, "one failure is below the threshold");
    }

    #[tokio::test]
    async fn test_third_consecutive_failure_sends_one_alert() {
        let h = harness(
            StaticSource::failing(),
            MemorySink::default(),
            MemoryHistory::with_rows(failed_rows(2)),
        );
        assert!(h.service.run().await.is_err());
        assert_eq!(h.notifier.calls(), 1);

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent[0].len(), 3);
        assert!(sent[0][0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("AUTHENTICATION_REQUIRED"));
    }

    #[tokio::test]
    async fn test_failed_batch_records_partial_and_errors() {
        let records: Vec<_> = (0..5)
            .map(|i| customer(&format!("rec{i}"), &format!("Customer {i} (US)")))
            .collect();
        let h = harness_with_batch(
            StaticSource::new(records),
            MemorySink::failing(&[2]),
            MemoryHistory::default(),
            2,
        );

        match h.service.run().await.unwrap_err() {
            SyncError::PartialWrite(report) => {
                assert_eq!(report.records_synced, 3);
                assert_eq!(report.records_failed, 2);
                assert_eq!(report.status, SyncStatus::Partial);
            }
            other => panic!("unexpected error: {other}"),
        }

        let rows = h.history.all();
        assert_eq!(rows[0].status, SyncStatus::Partial);
        assert_eq!(rows[0].records_updated, 3);
        assert_eq!(rows[0].records_failed, 2);
        assert_eq!(h.sink.stored_ids(), vec!["rec0", "rec1", "rec4"]);
    }

    #[tokio::test]
    async fn test_partial_run_evaluates_but_does_not_count_as_failure() {
        let h = harness_with_batch(
            StaticSource::new(vec![customer("a", "A (US)")]),
            MemorySink::failing(&[1]),
            MemoryHistory::with_rows(failed_rows(2)),
            10,
        );
        assert!(h.service.run().await.is_err());
        assert_eq!(h.notifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_run_only_picks_up_new_changes() {
        let h = harness(
            StaticSource::new(vec![customer("rec1", "Acme (US)")]),
            MemorySink::default(),
            MemoryHistory::default(),
        );
        let first = h.service.run().await.unwrap();
        assert_eq!(first.records_synced, 1);

        let second = h.service.run().await.unwrap();
        assert!(second.high_water_mark.is_some());
        assert_eq!(second.records_changed, 0);
        assert_eq!(h.source.calls(), 2);
        assert_eq!(h.history.all().len(), 2);
    }

    #[tokio::test]
    async fn test_full_resync_of_same_records_is_idempotent() {
        let detailed = record(
            "rec1",
            Utc::now() - Duration::days(30),
            json!({
                "客戶": ["recCustA", "recCustB"],
                "客戶名稱+國家": ["Acme (US)"],
                "類別": ["Sales"],
                "簡述(en)": "Renewal call"
            }),
        );
        let h = harness(
            StaticSource::new(vec![detailed, customer("rec2", "Globex (DE)")]),
            MemorySink::default(),
            MemoryHistory::default(),
        );

        h.service.run().await.unwrap();
        let after_first = h.sink.rows.lock().unwrap().clone();

        // Clearing the mark forces the same records through the write path again.
        *h.sink.mark.lock().unwrap() = None;
        let second = h.service.run().await.unwrap();
        assert_eq!(second.records_synced, 2);

        let after_second = h.sink.rows.lock().unwrap().clone();
        assert_eq!(after_second.len(), 2);
        assert_eq!(after_second, after_first);
        assert_eq!(h.sink.batches_seen(), 2);
    }
}
