//! Result types for database operations.

use serde::{Deserialize, Deserializer, Serialize};

/// One result row: column name to value, in server column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of an INSERT, UPDATE or DELETE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub affected_rows: u64,
    /// Set when the write could not be confirmed.
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            affected_rows: 0,
            error: Some(error.into()),
        }
    }
}

/// A column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(default)]
    pub cid: i64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
    #[serde(rename = "notnull", default, deserialize_with = "flag")]
    pub not_null: bool,
    #[serde(rename = "dflt_value", default)]
    pub default_value: Option<serde_json::Value>,
    #[serde(rename = "pk", default, deserialize_with = "flag")]
    pub primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            cid: 0,
            name: name.into(),
            column_type: column_type.into(),
            not_null: false,
            default_value: None,
            primary_key: false,
        }
    }
}

/// SQLite reports flags as integers; `pk` holds the key position.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    })
}
