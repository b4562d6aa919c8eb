//! Typed values for dynamic record attributes.
//!
//! The field registry is the single source of truth for which attribute
//! names are legal on a source's store and what type they hold; `FieldValue`
//! is the only value shape that crosses the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inferred data type of a registered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Free-form text with a bounded display length.
    Text,
    /// Whole numbers.
    Integer,
    /// Numbers with a fractional component.
    Real,
    /// True/false flags.
    Boolean,
    /// Timestamps and calendar dates.
    DateTime,
}

impl DataType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Integer => "integer",
            DataType::Real => "real",
            DataType::Boolean => "boolean",
            DataType::DateTime => "datetime",
        }
    }

    /// SQLite column type used when a field of this type is added to a
    /// source's record table.
    ///
    /// Booleans are stored as 0/1 integers; datetimes as ISO-8601 text for
    /// portability.
    #[must_use]
    pub fn sql_type(&self) -> &'static str {
        match self {
            DataType::Text => "TEXT",
            DataType::Integer => "INTEGER",
            DataType::Real => "REAL",
            DataType::Boolean => "INTEGER",
            DataType::DateTime => "TEXT",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(DataType::Text),
            "integer" => Ok(DataType::Integer),
            "real" => Ok(DataType::Real),
            "boolean" => Ok(DataType::Boolean),
            "datetime" => Ok(DataType::DateTime),
            _ => Err(format!("Unknown data type: {s}")),
        }
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A text value.
    Text(String),
    /// A whole-number value.
    Integer(i64),
    /// A fractional value.
    Real(f64),
    /// A boolean value.
    Boolean(bool),
    /// A timestamp value.
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    /// The data type of this value.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            FieldValue::Text(_) => DataType::Text,
            FieldValue::Integer(_) => DataType::Integer,
            FieldValue::Real(_) => DataType::Real,
            FieldValue::Boolean(_) => DataType::Boolean,
            FieldValue::DateTime(_) => DataType::DateTime,
        }
    }

    /// Get as text if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer if this is an integer value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Render the value the way it is persisted in a TEXT column.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Real(r) => r.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::DateTime(dt) => dt.to_rfc3339(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(r: f64) -> Self {
        FieldValue::Real(r)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(dt: DateTime<Utc>) -> Self {
        FieldValue::DateTime(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_roundtrip() {
        for dt in [
            DataType::Text,
            DataType::Integer,
            DataType::Real,
            DataType::Boolean,
            DataType::DateTime,
        ] {
            let parsed: DataType = dt.as_str().parse().unwrap();
            assert_eq!(parsed, dt);
        }
    }

    #[test]
    fn test_sql_types() {
        assert_eq!(DataType::Boolean.sql_type(), "INTEGER");
        assert_eq!(DataType::DateTime.sql_type(), "TEXT");
        assert_eq!(DataType::Real.sql_type(), "REAL");
    }

    #[test]
    fn test_field_value_types() {
        assert_eq!(FieldValue::from("x").data_type(), DataType::Text);
        assert_eq!(FieldValue::from(42i64).data_type(), DataType::Integer);
        assert_eq!(FieldValue::from(3.5).data_type(), DataType::Real);
        assert_eq!(FieldValue::from(true).data_type(), DataType::Boolean);
    }
}
