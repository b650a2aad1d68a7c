use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values that can be bound as parameters or returned in a result row.
///
/// Every backend converts to and from this enum, so the pool and the typed
/// layer never branch on driver types:
/// ```rust
/// use sql_dispatch::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Booleans also accept the 0/1 integers `SQLite` stores them as.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(dt);
                }
            }
        }
        None
    }

    /// Floats also accept integers, which `SQLite` may hand back for REAL columns.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<JsonValue> {
        match self {
            RowValues::JSON(value) => Some(value.clone()),
            RowValues::Text(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }

    /// The column type this value would be reported as when nothing better is known.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            RowValues::Int(_) => ColumnType::Int,
            RowValues::Float(_) => ColumnType::Float,
            RowValues::Text(_) => ColumnType::Text,
            RowValues::Bool(_) => ColumnType::Bool,
            RowValues::Timestamp(_) => ColumnType::Timestamp,
            RowValues::Null => ColumnType::Untyped,
            RowValues::JSON(_) => ColumnType::Json,
            RowValues::Blob(_) => ColumnType::Blob,
        }
    }
}

/// Column types as compared by `Results::verify`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Bool,
    Timestamp,
    Json,
    Blob,
    /// The backend could not name the type and no value revealed it.
    Untyped,
    /// A backend type with no counterpart here; never matches a declaration.
    Other(String),
}

impl ColumnType {
    /// Whether a column the backend reported as `actual` satisfies this declaration.
    #[must_use]
    pub fn accepts(&self, actual: &ColumnType) -> bool {
        match actual {
            ColumnType::Untyped => true,
            ColumnType::Other(_) => false,
            _ => self == actual,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => f.write_str("int"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Text => f.write_str("text"),
            ColumnType::Bool => f.write_str("bool"),
            ColumnType::Timestamp => f.write_str("timestamp"),
            ColumnType::Json => f.write_str("json"),
            ColumnType::Blob => f.write_str("blob"),
            ColumnType::Untyped => f.write_str("untyped"),
            ColumnType::Other(name) => write!(f, "other({name})"),
        }
    }
}

/// Name and type of one column in a backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// The database type supported by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `SQLite` database
    Sqlite,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Postgres => f.write_str("postgres"),
            DatabaseType::Sqlite => f.write_str("sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_column_satisfies_any_declaration() {
        assert!(ColumnType::Int.accepts(&ColumnType::Untyped));
        assert!(ColumnType::Text.accepts(&ColumnType::Text));
        assert!(!ColumnType::Text.accepts(&ColumnType::Int));
        assert!(!ColumnType::Text.accepts(&ColumnType::Other("inet4".into())));
    }

    #[test]
    fn timestamps_parse_from_sqlite_text() {
        let v = RowValues::Text("2024-03-01 12:30:45".into());
        let ts = v.as_timestamp().unwrap();
        assert_eq!(ts.format("%F %T").to_string(), "2024-03-01 12:30:45");

        let fractional = RowValues::Text("2024-03-01 12:30:45.250".into());
        assert!(fractional.as_timestamp().is_some());
        assert!(RowValues::Text("not a date".into()).as_timestamp().is_none());
    }

    #[test]
    fn bool_accepts_zero_one_integers_only() {
        assert_eq!(RowValues::Int(1).as_bool(), Some(true));
        assert_eq!(RowValues::Int(0).as_bool(), Some(false));
        assert_eq!(RowValues::Int(2).as_bool(), None);
        assert_eq!(RowValues::Bool(true).as_bool(), Some(true));
    }
}
