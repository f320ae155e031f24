//! Core types shared by the metre modules

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Result type for metre operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unique key of a chapter node
pub type ChapterKey = String;

/// Stable identifier of a line item
pub type LineId = String;

/// Identifier of a project version
pub type VersionId = String;

/// Error types for metre operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Chapter not found: {0}")]
    ChapterNotFound(ChapterKey),

    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Loading failed: {0}")]
    Backend(String),
}

/// Storage-related errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A loosely typed cell value as entered in a grid.
///
/// Grid edits and backend payloads may carry numbers as text; numeric
/// fields go through [`CellValue::as_number`] which never yields `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    /// Number value
    Number(f64),

    /// String value
    Text(String),

    /// Empty cell
    #[default]
    Empty,
}

impl CellValue {
    /// Numeric reading of the cell; anything that is not a finite number is 0.
    pub fn as_number(&self) -> f64 {
        match self {
            CellValue::Number(n) => finite_or_zero(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().map(finite_or_zero).unwrap_or(0.0),
            CellValue::Empty => 0.0,
        }
    }

    /// Textual reading of the cell.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Empty => String::new(),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

/// Replace `NaN` and infinities with 0.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Deserialize a numeric field that may arrive as a number, a numeric
/// string, `null`, or garbage. Garbage reads as 0.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(finite_or_zero).unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => CellValue::Text(s).as_number(),
        _ => 0.0,
    })
}

/// Deserialize a text field that may arrive as a string, a number, or `null`.
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}
