//! Field registry entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::Source;
use crate::value::DataType;

/// One known column in a source's record table.
///
/// Once registered, `data_type` is immutable: later migrations may add new
/// fields but never retype or remove existing ones, since a concurrent
/// record might already hold typed data under the old type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRegistryEntry {
    /// Source whose store this field belongs to.
    pub source: Source,
    /// Column name.
    pub field_name: String,
    /// Inferred data type.
    pub data_type: DataType,
    /// Display length bound for text fields.
    pub max_length: Option<i64>,
    /// Whether the field is required on every record.
    pub is_required: bool,
    /// When the field was first registered.
    pub added_at: DateTime<Utc>,
}

impl FieldRegistryEntry {
    /// Create a new entry added now.
    #[must_use]
    pub fn new(source: Source, field_name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            source,
            field_name: field_name.into(),
            data_type,
            max_length: None,
            is_required: false,
            added_at: Utc::now(),
        }
    }

    /// Set the text length bound.
    #[must_use]
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Mark the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let entry = FieldRegistryEntry::new(Source::Upload, "department", DataType::Text)
            .with_max_length(120)
            .required();
        assert_eq!(entry.field_name, "department");
        assert_eq!(entry.max_length, Some(120));
        assert!(entry.is_required);
    }
}
