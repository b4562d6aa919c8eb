//! Cross-source email conflict detection.

use std::collections::BTreeMap;
use tracing::{info, instrument};

use unidir_core::{ConflictingUser, EmailConflict, Source};
use unidir_store::{SourceStore, StoreResult};

/// Scans every source's store for emails present in more than one source.
///
/// Same-source duplicates cannot occur (per-source email uniqueness is a
/// store invariant) and are never reported as conflicts.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    store: SourceStore,
}

impl ConflictDetector {
    /// Create a detector over the given store.
    #[must_use]
    pub fn new(store: SourceStore) -> Self {
        Self { store }
    }

    /// Recompute the current conflict set.
    #[instrument(skip(self))]
    pub async fn detect_email_conflicts(&self) -> StoreResult<Vec<EmailConflict>> {
        let mut by_email: BTreeMap<String, Vec<ConflictingUser>> = BTreeMap::new();

        for source in Source::ALL {
            for record in self.store.get_records(source, None, None).await? {
                by_email
                    .entry(record.email_lower())
                    .or_default()
                    .push(ConflictingUser {
                        id: record.id.clone(),
                        source,
                        display_name: record.label(),
                        last_synced_at: record.last_synced_at,
                    });
            }
        }

        let conflicts: Vec<EmailConflict> = by_email
            .into_iter()
            .filter_map(|(email, users)| {
                let mut sources: Vec<Source> =
                    users.iter().map(|user| user.source).collect();
                sources.sort_unstable();
                sources.dedup();
                if sources.len() < 2 {
                    return None;
                }
                Some(EmailConflict {
                    email,
                    sources,
                    users,
                })
            })
            .collect();

        if !conflicts.is_empty() {
            info!(count = conflicts.len(), "Email conflicts detected");
        }
        Ok(conflicts)
    }
}
