//! Field-name resolution table.
//!
//! Source field names are volatile (they are whatever the base owners typed,
//! in this deployment mostly Chinese). Every lookup goes through a `FieldMap`
//! that maps a canonical target field to an ordered list of source names, so
//! a renamed column is a table edit rather than a code change.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    LinkedCustomers,
    CustomerNameCountry,
    Categories,
    SummaryEn,
    SummaryCn,
    SummaryIdioma,
    UpdateContent,
    UpdateContentIdioma,
    AirtableLastModified,
}

#[derive(Debug, Error)]
pub enum FieldMapError {
    #[error("Failed to read field map {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid field map {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Field map entry '{0:?}' lists no source fields")]
    Empty(CanonicalField),
}

#[derive(Debug, Clone)]
pub struct FieldMap {
    sources: HashMap<CanonicalField, Vec<String>>,
}

impl Default for FieldMap {
    fn default() -> Self {
        use CanonicalField::*;

        let defaults: [(CanonicalField, &[&str]); 9] = [
            (LinkedCustomers, &["客戶"]),
            (CustomerNameCountry, &["客戶名稱+國家", "客戶名稱"]),
            (Categories, &["類別"]),
            (SummaryEn, &["簡述(en)"]),
            (SummaryCn, &["簡述(cn)"]),
            (SummaryIdioma, &["簡述(Idioma)"]),
            (UpdateContent, &["更新內容"]),
            (UpdateContentIdioma, &["更新內容(客戶語言)"]),
            (AirtableLastModified, &["最後更新"]),
        ];

        Self {
            sources: defaults
                .into_iter()
                .map(|(field, names)| (field, names.iter().map(|n| n.to_string()).collect()))
                .collect(),
        }
    }
}

impl FieldMap {
    /// Default table with the entries of a JSON override applied on top.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let overrides: HashMap<CanonicalField, Vec<String>> = serde_json::from_str(json)?;
        let mut map = Self::default();
        map.sources.extend(overrides);
        Ok(map)
    }

    pub fn from_file(path: &Path) -> Result<Self, FieldMapError> {
        let display = path.display().to_string();
        let json = std::fs::read_to_string(path).map_err(|source| FieldMapError::Io {
            path: display.clone(),
            source,
        })?;
        let map = Self::from_json_str(&json).map_err(|source| FieldMapError::Parse {
            path: display,
            source,
        })?;
        map.validate()?;
        Ok(map)
    }

    fn validate(&self) -> Result<(), FieldMapError> {
        for (field, names) in &self.sources {
            if names.iter().all(|n| n.trim().is_empty()) {
                return Err(FieldMapError::Empty(*field));
            }
        }
        Ok(())
    }

    pub fn source_names(&self, field: CanonicalField) -> &[String] {
        self.sources.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First non-empty single value among the field's source names.
    pub fn scalar(&self, fields: &Map<String, Value>, field: CanonicalField) -> Option<String> {
        self.source_names(field)
            .iter()
            .filter_map(|name| fields.get(name))
            .map(scalar_value)
            .find(|v| !v.is_empty())
    }

    /// First non-empty list of linked ids among the field's source names.
    pub fn list(&self, fields: &Map<String, Value>, field: CanonicalField) -> Vec<String> {
        self.source_names(field)
            .iter()
            .filter_map(|name| fields.get(name))
            .map(linked_ids)
            .find(|ids| !ids.is_empty())
            .unwrap_or_default()
    }
}

/// Collapses a field value to one display string: the first element of an
/// array, the text of a scalar, empty for null.
pub fn scalar_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items.first().map(scalar_value).unwrap_or_default(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Object(_) => String::new(),
    }
}

/// Keeps every id of a linked-record field. A lone string counts as one id.
pub fn linked_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
