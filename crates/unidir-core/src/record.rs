//! Canonical identity record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::source::Source;
use crate::value::FieldValue;

/// Canonical normalized user representation, stored per source.
///
/// The typed core is fixed; everything else a source reports lands in the
/// `attributes` bag, gated by that source's field registry. `email` is
/// compared lowercased but stored with its original casing for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Opaque, source-prefixed identifier (e.g. `ldap_3f2a...`).
    pub id: String,
    /// Email address, case preserved.
    pub email: String,
    /// First / given name.
    pub first_name: Option<String>,
    /// Last / family name.
    pub last_name: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
    /// Whether the account is active in its source.
    pub is_active: bool,
    /// When this record was last written by a sync run.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Which source this record belongs to.
    pub source: Source,
    /// Source-native key used for upsert matching.
    pub external_id: Option<String>,
    /// When the record was first inserted.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
    /// Source-specific attributes, keyed by registered field name.
    #[serde(default)]
    pub attributes: BTreeMap<String, FieldValue>,
}

impl IdentityRecord {
    /// Create a new record for a source with the minimum required fields.
    ///
    /// `id`, `created_at`, and `updated_at` are assigned here but the store
    /// regenerates them on first insert, so callers building records for
    /// upsert need not care about their initial values.
    #[must_use]
    pub fn new(source: Source, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_record_id(source),
            email: email.into(),
            first_name: None,
            last_name: None,
            display_name: None,
            is_active: true,
            last_synced_at: None,
            source,
            external_id: None,
            created_at: now,
            updated_at: now,
            attributes: BTreeMap::new(),
        }
    }

    /// Set the source-native key.
    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Set the name fields.
    #[must_use]
    pub fn with_names(
        mut self,
        first_name: Option<String>,
        last_name: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        self.first_name = first_name;
        self.last_name = last_name;
        self.display_name = display_name;
        self
    }

    /// Set a dynamic attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Lowercased email, used for uniqueness and conflict grouping.
    #[must_use]
    pub fn email_lower(&self) -> String {
        self.email.to_lowercase()
    }

    /// Best-effort human label: display name, assembled name, or email.
    #[must_use]
    pub fn label(&self) -> String {
        if let Some(name) = &self.display_name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

/// Generate a fresh source-prefixed record id.
#[must_use]
pub fn generate_record_id(source: Source) -> String {
    format!("{}_{}", source.as_str(), Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_source_prefixed() {
        let id = generate_record_id(Source::Ldap);
        assert!(id.starts_with("ldap_"));
    }

    #[test]
    fn test_email_lower() {
        let record = IdentityRecord::new(Source::Directory, "Jane.Doe@Example.COM");
        assert_eq!(record.email_lower(), "jane.doe@example.com");
        assert_eq!(record.email, "Jane.Doe@Example.COM");
    }

    #[test]
    fn test_label_fallbacks() {
        let record = IdentityRecord::new(Source::Manual, "a@x.com");
        assert_eq!(record.label(), "a@x.com");

        let record = record.with_names(Some("Ada".into()), Some("Lovelace".into()), None);
        assert_eq!(record.label(), "Ada Lovelace");

        let record = record.with_names(
            Some("Ada".into()),
            Some("Lovelace".into()),
            Some("Ada L.".into()),
        );
        assert_eq!(record.label(), "Ada L.");
    }
}
