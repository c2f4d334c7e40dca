use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SyncStatus::Success),
            "partial" => Ok(SyncStatus::Partial),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

/// Audit record written once per orchestrator invocation. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncHistory {
    pub sync_time: DateTime<Utc>,
    pub records_checked: i32,
    pub records_inserted: i32,
    pub records_updated: i32,
    pub records_failed: i32,
    pub records_skipped: i32,
    pub status: SyncStatus,
    pub error_message: Option<String>,
}

impl SyncHistory {
    /// A run that aborted before the write phase.
    pub fn failed(records_checked: i32, error_message: String) -> Self {
        Self {
            sync_time: Utc::now(),
            records_checked,
            records_inserted: 0,
            records_updated: 0,
            records_failed: 0,
            records_skipped: 0,
            status: SyncStatus::Failed,
            error_message: Some(error_message),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == SyncStatus::Failed
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SyncHistoryRow {
    pub id: i64,
    pub sync_time: DateTime<Utc>,
    pub records_checked: i32,
    pub records_inserted: i32,
    pub records_updated: i32,
    pub records_failed: i32,
    pub records_skipped: i32,
    pub status: String,
    pub error_message: Option<String>,
}

impl TryFrom<SyncHistoryRow> for SyncHistory {
    type Error = String;

    fn try_from(row: SyncHistoryRow) -> Result<Self, Self::Error> {
        Ok(SyncHistory {
            sync_time: row.sync_time,
            records_checked: row.records_checked,
            records_inserted: row.records_inserted,
            records_updated: row.records_updated,
            records_failed: row.records_failed,
            records_skipped: row.records_skipped,
            status: row.status.parse()?,
            error_message: row.error_message,
        })
    }
}
