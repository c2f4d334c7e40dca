//! Sink Writer: idempotent batched upserts into `customer_interactions`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::interaction::InteractionEntity;

/// Bind parameters per upserted row.
pub const COLUMNS_PER_ROW: usize = 11;
/// Postgres caps a statement at 65535 bind parameters.
pub const MAX_BATCH_SIZE: usize = u16::MAX as usize / COLUMNS_PER_ROW;
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Batch rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait InteractionSink: Send + Sync {
    /// Latest `last_synced` value in the table, `None` when it is empty.
    async fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>, SinkError>;

    /// Upserts one batch atomically, keyed on `airtable_id`.
    async fn upsert_batch(&self, batch: &[InteractionEntity]) -> Result<(), SinkError>;

    async fn count(&self) -> Result<i64, SinkError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub success: usize,
    pub failed: usize,
}

/// Writes `entities` in fixed-size batches, never larger than
/// `MAX_BATCH_SIZE`. A failed batch adds its whole size to `failed` and the
/// remaining batches are still attempted. No retries.
pub async fn upsert_in_batches(
    sink: &dyn InteractionSink,
    entities: &[InteractionEntity],
    batch_size: usize,
) -> UpsertOutcome {
    let mut outcome = UpsertOutcome::default();
    let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
    let total_batches = entities.len().div_ceil(batch_size);

    for (index, batch) in entities.chunks(batch_size).enumerate() {
        let batch_no = index + 1;
        match sink.upsert_batch(batch).await {
            Ok(()) => {
                outcome.success += batch.len();
                info!(batch = batch_no, total_batches, rows = batch.len(), "batch synced");
            }
            Err(e) => {
                outcome.failed += batch.len();
                warn!(
                    batch = batch_no,
                    total_batches,
                    rows = batch.len(),
                    error = %e,
                    "batch upsert failed"
                );
            }
        }
    }

    outcome
}

#[derive(Clone)]
pub struct PgInteractionSink {
    pool: PgPool,
}

impl PgInteractionSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionSink for PgInteractionSink {
    async fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>, SinkError> {
        Ok(sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(last_synced) FROM customer_interactions",
        )
        .fetch_one(&self.pool)
        .await?)
    }

    async fn upsert_batch(&self, batch: &[InteractionEntity]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let synced_at = Utc::now();

        // Single statement, so the batch commits or fails as a whole. Every
        // non-key column is overwritten on conflict: full replace, no merge.
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO customer_interactions
                (airtable_id, linked_customers, customer_name_country, categories,
                 summary_en, summary_cn, summary_idioma, update_content,
                 update_content_idioma, airtable_last_modified, last_synced) ",
        );
        qb.push_values(batch, |mut b, e| {
            b.push_bind(&e.airtable_id)
                .push_bind(&e.linked_customers)
                .push_bind(&e.customer_name_country)
                .push_bind(&e.categories)
                .push_bind(&e.summary_en)
                .push_bind(&e.summary_cn)
                .push_bind(&e.summary_idioma)
                .push_bind(&e.update_content)
                .push_bind(&e.update_content_idioma)
                .push_bind(&e.airtable_last_modified)
                .push_bind(synced_at);
        });
        qb.push(
            " ON CONFLICT (airtable_id) DO UPDATE SET
                linked_customers = EXCLUDED.linked_customers,
                customer_name_country = EXCLUDED.customer_name_country,
                categories = EXCLUDED.categories,
                summary_en = EXCLUDED.summary_en,
                summary_cn = EXCLUDED.summary_cn,
                summary_idioma = EXCLUDED.summary_idioma,
                update_content = EXCLUDED.update_content,
                update_content_idioma = EXCLUDED.update_content_idioma,
                airtable_last_modified = EXCLUDED.airtable_last_modified,
                last_synced = EXCLUDED.last_synced,
                updated_at = now()",
        );

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() != batch.len() as u64 {
            return Err(SinkError::Rejected(format!(
                "expected {} rows, {} affected",
                batch.len(),
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64, SinkError> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customer_interactions")
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    /// In-memory sink. Batches whose 1-based number is in `failing_batches`
    /// are rejected without touching the store.
    #[derive(Default)]
    pub struct MemorySink {
        pub rows: Mutex<BTreeMap<String, InteractionEntity>>,
        pub mark: Mutex<Option<DateTime<Utc>>>,
        pub failing_batches: HashSet<usize>,
        pub fail_mark_read: bool,
        pub batches_seen: Mutex<usize>,
    }

    impl MemorySink {
        pub fn with_mark(mark: Option<DateTime<Utc>>) -> Self {
            Self {
                mark: Mutex::new(mark),
                ..Default::default()
            }
        }

        pub fn failing(batches: &[usize]) -> Self {
            Self {
                failing_batches: batches.iter().copied().collect(),
                ..Default::default()
            }
        }

        pub fn batches_seen(&self) -> usize {
            *self.batches_seen.lock().unwrap()
        }

        pub fn stored_ids(&self) -> Vec<String> {
            self.rows.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl InteractionSink for MemorySink {
        async fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>, SinkError> {
            if self.fail_mark_read {
                return Err(SinkError::Rejected("mark unavailable".to_string()));
            }
            Ok(*self.mark.lock().unwrap())
        }

        async fn upsert_batch(&self, batch: &[InteractionEntity]) -> Result<(), SinkError> {
            let batch_no = {
                let mut seen = self.batches_seen.lock().unwrap();
                *seen += 1;
                *seen
            };
            if self.failing_batches.contains(&batch_no) {
                return Err(SinkError::Rejected(format!("batch {batch_no} refused")));
            }
            let mut rows = self.rows.lock().unwrap();
            for e in batch {
                rows.insert(e.airtable_id.clone(), e.clone());
            }
            *self.mark.lock().unwrap() = Some(Utc::now());
            Ok(())
        }

        async fn count(&self) -> Result<i64, SinkError> {
            Ok(self.rows.lock().unwrap().len() as i64)
        }
    }
}
