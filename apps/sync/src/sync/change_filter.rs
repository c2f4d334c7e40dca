//! Change Filter: picks the records that changed after the high-water mark.
//!
//! A record is selected when its modification-time field is strictly after
//! the mark. A date-only value is selected when it falls on or after the
//! mark's day. Without that field the creation time is compared instead. A
//! modification time that is present but cannot be parsed selects the record:
//! re-writing an unchanged row is harmless, skipping a changed one is not.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use crate::models::source::SourceRecord;
use crate::sync::fields::{CanonicalField, FieldMap};

/// `None` for the mark means no prior sync, so everything is selected.
pub fn select_changed<'a>(
    records: &'a [SourceRecord],
    high_water_mark: Option<DateTime<Utc>>,
    fields: &FieldMap,
) -> Vec<&'a SourceRecord> {
    match high_water_mark {
        None => records.iter().collect(),
        Some(mark) => records
            .iter()
            .filter(|r| is_changed(r, mark, fields))
            .collect(),
    }
}

pub fn is_changed(record: &SourceRecord, mark: DateTime<Utc>, fields: &FieldMap) -> bool {
    match fields.scalar(&record.fields, CanonicalField::AirtableLastModified) {
        Some(raw) => match parse_modified(&raw) {
            Some(modified) => modified.is_after(mark),
            None => {
                warn!(
                    record_id = %record.id,
                    value = %raw,
                    "unparseable modification time, including record"
                );
                true
            }
        },
        None => record.created_time > mark,
    }
}

/// A parsed modification time, at the precision the source gave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifiedAt {
    Instant(DateTime<Utc>),
    /// Date-only value: the edit happened at some unknown time that day.
    Day(NaiveDate),
}

impl ModifiedAt {
    /// A bare date counts as changed when it falls on or after the mark's
    /// day, since an edit later that same day cannot be told apart.
    pub fn is_after(&self, mark: DateTime<Utc>) -> bool {
        match self {
            ModifiedAt::Instant(t) => *t > mark,
            ModifiedAt::Day(d) => *d >= mark.date_naive(),
        }
    }
}

/// Accepts RFC 3339, a naive date-time (taken as UTC) or a bare date (kept
/// as a day, in UTC).
pub fn parse_modified(raw: &str) -> Option<ModifiedAt> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(ModifiedAt::Instant(dt.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ModifiedAt::Instant(naive.and_utc()));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(ModifiedAt::Day)
}
