//! Read-only unified view across all per-source stores.
//!
//! Merges every requested source's records into one listing with in-memory
//! search, filtering, sorting, and pagination. Never writes back.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::instrument;

use unidir_core::{IdentityRecord, Source};
use unidir_store::{SourceStore, StoreResult};

/// Field to sort the unified listing by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Email,
    FirstName,
    LastName,
    DisplayName,
    Source,
    IsActive,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Filter, sort, and pagination parameters for the unified listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFilter {
    /// Substring search over email and name fields, case-insensitive.
    pub search: Option<String>,
    /// Restrict to records with this active flag.
    pub is_active: Option<bool>,
    /// Restrict to these sources (all four when empty).
    pub sources: Vec<Source>,
    /// Sort field.
    pub sort_by: SortField,
    /// Sort direction.
    pub sort_direction: SortDirection,
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub page_size: usize,
}

impl Default for UserFilter {
    fn default() -> Self {
        Self {
            search: None,
            is_active: None,
            sources: Vec::new(),
            sort_by: SortField::Email,
            sort_direction: SortDirection::Asc,
            page: 1,
            page_size: 50,
        }
    }
}

/// One record projected into the unified listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedUser {
    /// Record id within its source's store.
    pub id: String,
    /// Email, case preserved.
    pub email: String,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
    /// Active flag.
    pub is_active: bool,
    /// Which store the record lives in.
    pub source: Source,
    /// The full per-source record, dynamic attributes included.
    pub record: IdentityRecord,
    /// Emails conflicting with this user; filled by the caller if desired.
    pub conflicts: Vec<String>,
}

impl From<IdentityRecord> for UnifiedUser {
    fn from(record: IdentityRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            display_name: record.display_name.clone(),
            is_active: record.is_active,
            source: record.source,
            record,
            conflicts: Vec::new(),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total matching items across all pages.
    pub total: usize,
    /// 1-based page number.
    pub page: usize,
    /// Page size used.
    pub page_size: usize,
    /// Total number of pages.
    pub total_pages: usize,
}

/// Per-source record counts for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCount {
    pub source: Source,
    pub total: i64,
    pub active: i64,
}

/// Dashboard statistics across every store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub per_source: Vec<SourceCount>,
    pub total_users: i64,
    pub total_active: i64,
    pub conflict_count: usize,
}

/// Read-only merge view over all per-source stores.
#[derive(Debug, Clone)]
pub struct UnifiedAggregator {
    store: SourceStore,
}

impl UnifiedAggregator {
    /// Create an aggregator over the given store.
    #[must_use]
    pub fn new(store: SourceStore) -> Self {
        Self { store }
    }

    /// List users across sources with filtering, sorting, and pagination.
    #[instrument(skip(self, filter))]
    pub async fn unified_users(&self, filter: &UserFilter) -> StoreResult<Page<UnifiedUser>> {
        let sources: Vec<Source> = if filter.sources.is_empty() {
            Source::ALL.to_vec()
        } else {
            filter.sources.clone()
        };

        let mut users: Vec<UnifiedUser> = Vec::new();
        for source in sources {
            for record in self.store.get_records(source, None, None).await? {
                users.push(record.into());
            }
        }

        if let Some(search) = filter.search.as_deref() {
            let needle = search.to_lowercase();
            users.retain(|user| matches_search(user, &needle));
        }
        if let Some(is_active) = filter.is_active {
            users.retain(|user| user.is_active == is_active);
        }

        users.sort_by(|a, b| {
            let ordering = compare(a, b, filter.sort_by);
            match filter.sort_direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        Ok(paginate(users, filter.page, filter.page_size))
    }

    /// Summarize record counts per source.
    pub async fn source_counts(&self) -> StoreResult<Vec<SourceCount>> {
        let mut counts = Vec::with_capacity(Source::ALL.len());
        for source in Source::ALL {
            let records = self.store.get_records(source, None, None).await?;
            let active = records.iter().filter(|r| r.is_active).count() as i64;
            counts.push(SourceCount {
                source,
                total: records.len() as i64,
                active,
            });
        }
        Ok(counts)
    }
}

fn matches_search(user: &UnifiedUser, needle: &str) -> bool {
    let haystacks = [
        Some(user.email.as_str()),
        user.first_name.as_deref(),
        user.last_name.as_deref(),
        user.display_name.as_deref(),
    ];
    haystacks
        .into_iter()
        .flatten()
        .any(|text| text.to_lowercase().contains(needle))
}

/// Field comparator: date-aware for timestamp fields, case-insensitive for
/// strings, with missing values ordered last.
fn compare(a: &UnifiedUser, b: &UnifiedUser, field: SortField) -> Ordering {
    match field {
        SortField::Email => cmp_str(Some(&a.email), Some(&b.email)),
        SortField::FirstName => cmp_str(a.first_name.as_deref(), b.first_name.as_deref()),
        SortField::LastName => cmp_str(a.last_name.as_deref(), b.last_name.as_deref()),
        SortField::DisplayName => cmp_str(a.display_name.as_deref(), b.display_name.as_deref()),
        SortField::Source => a.source.cmp(&b.source),
        SortField::IsActive => a.is_active.cmp(&b.is_active).reverse(),
        SortField::LastSyncedAt => cmp_option(a.record.last_synced_at, b.record.last_synced_at),
        SortField::CreatedAt => a.record.created_at.cmp(&b.record.created_at),
        SortField::UpdatedAt => a.record.updated_at.cmp(&b.record.updated_at),
    }
}

fn cmp_str(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_option<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(page_size).max(1);

    let start = (page - 1).saturating_mul(page_size);
    let items: Vec<T> = items
        .into_iter()
        .skip(start)
        .take(page_size)
        .collect();

    Page {
        items,
        total,
        page,
        page_size,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unidir_core::IdentityRecord;
    use unidir_store::connect_in_memory;

    async fn setup() -> (SourceStore, UnifiedAggregator) {
        let pool = connect_in_memory().await.unwrap();
        let store = SourceStore::new(pool);
        for source in Source::ALL {
            store.initialize(source).await.unwrap();
        }
        let aggregator = UnifiedAggregator::new(store.clone());
        (store, aggregator)
    }

    async fn seed(store: &SourceStore) {
        let records = [
            (Source::Directory, "carol@x.com", Some("Carol"), true),
            (Source::Directory, "bob@x.com", Some("Bob"), false),
            (Source::Ldap, "alice@y.com", Some("alice"), true),
            (Source::Manual, "dave@z.com", None, true),
        ];
        for (source, email, first, active) in records {
            let mut record = IdentityRecord::new(source, email);
            record.first_name = first.map(String::from);
            record.is_active = active;
            store.upsert(source, &record).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_merges_all_sources_sorted_by_email() {
        let (store, aggregator) = setup().await;
        seed(&store).await;

        let page = aggregator
            .unified_users(&UserFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        let emails: Vec<&str> = page.items.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(
            emails,
            vec!["alice@y.com", "bob@x.com", "carol@x.com", "dave@z.com"]
        );
    }

    #[tokio::test]
    async fn test_search_and_active_filter() {
        let (store, aggregator) = setup().await;
        seed(&store).await;

        let filter = UserFilter {
            search: Some("BOB".into()),
            ..UserFilter::default()
        };
        let page = aggregator.unified_users(&filter).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].email, "bob@x.com");

        let filter = UserFilter {
            is_active: Some(true),
            ..UserFilter::default()
        };
        let page = aggregator.unified_users(&filter).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_source_restriction() {
        let (store, aggregator) = setup().await;
        seed(&store).await;

        let filter = UserFilter {
            sources: vec![Source::Directory],
            ..UserFilter::default()
        };
        let page = aggregator.unified_users(&filter).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|u| u.source == Source::Directory));
    }

    #[tokio::test]
    async fn test_case_insensitive_name_sort_with_missing_last() {
        let (store, aggregator) = setup().await;
        seed(&store).await;

        let filter = UserFilter {
            sort_by: SortField::FirstName,
            ..UserFilter::default()
        };
        let page = aggregator.unified_users(&filter).await.unwrap();
        let firsts: Vec<Option<&str>> = page
            .items
            .iter()
            .map(|u| u.first_name.as_deref())
            .collect();
        // "alice" sorts with "Bob"/"Carol" case-insensitively; None last.
        assert_eq!(firsts, vec![Some("alice"), Some("Bob"), Some("Carol"), None]);
    }

    #[tokio::test]
    async fn test_pagination_bounds() {
        let (store, aggregator) = setup().await;
        seed(&store).await;

        let filter = UserFilter {
            page: 2,
            page_size: 3,
            ..UserFilter::default()
        };
        let page = aggregator.unified_users(&filter).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 1);

        let filter = UserFilter {
            page: 99,
            page_size: 3,
            ..UserFilter::default()
        };
        let page = aggregator.unified_users(&filter).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 4);
    }

    #[tokio::test]
    async fn test_source_counts() {
        let (store, aggregator) = setup().await;
        seed(&store).await;

        let counts = aggregator.source_counts().await.unwrap();
        let directory = counts
            .iter()
            .find(|c| c.source == Source::Directory)
            .unwrap();
        assert_eq!(directory.total, 2);
        assert_eq!(directory.active, 1);
    }
}
