//! Run Recorder: the append-only `sync_history` audit trail.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info};

use crate::models::sync_history::{SyncHistory, SyncHistoryRow};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt history row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert(&self, history: &SyncHistory) -> Result<(), HistoryError>;

    /// Most recent rows first.
    async fn recent(&self, limit: i64) -> Result<Vec<SyncHistory>, HistoryError>;
}

/// Persists one audit row. Failures are logged and swallowed: the audit trail
/// is best-effort and never changes the outcome of a run.
pub async fn record(store: &dyn HistoryStore, history: &SyncHistory) {
    match store.insert(history).await {
        Ok(()) => info!(
            status = %history.status,
            checked = history.records_checked,
            updated = history.records_updated,
            failed = history.records_failed,
            skipped = history.records_skipped,
            "sync history recorded"
        ),
        Err(e) => error!(error = %e, status = %history.status, "failed to record sync history"),
    }
}

#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn insert(&self, history: &SyncHistory) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            INSERT INTO sync_history
                (sync_time, records_checked, records_inserted, records_updated,
                 records_failed, records_skipped, status, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(history.sync_time)
        .bind(history.records_checked)
        .bind(history.records_inserted)
        .bind(history.records_updated)
        .bind(history.records_failed)
        .bind(history.records_skipped)
        .bind(history.status.as_str())
        .bind(&history.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<SyncHistory>, HistoryError> {
        let rows = sqlx::query_as::<_, SyncHistoryRow>(
            r#"
            SELECT id, sync_time, records_checked, records_inserted, records_updated,
                   records_failed, records_skipped, status, error_message
            FROM sync_history
            ORDER BY sync_time DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                SyncHistory::try_from(row).map_err(|reason| HistoryError::Corrupt { id, reason })
            })
            .collect()
    }
}
