//! Cross-source identity collisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::Source;

/// Lightweight projection of a record contributing to a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictingUser {
    /// Record id within its source's store.
    pub id: String,
    /// Source the record came from.
    pub source: Source,
    /// Human label of the record.
    pub display_name: String,
    /// When the record was last synced.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// The same email present in more than one source's store.
///
/// Derived data, recomputed on demand by the conflict detector; never
/// persisted as authoritative state, only surfaced for operator action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConflict {
    /// Lowercased email shared across sources.
    pub email: String,
    /// Distinct sources contributing a record, in canonical order.
    pub sources: Vec<Source>,
    /// One projection per contributing record.
    pub users: Vec<ConflictingUser>,
}

impl EmailConflict {
    /// Number of sources involved.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}
