//! Entity store adapter contract for the aggregator, plus the Postgres
//! implementation over [`ActivityRepo`].
//!
//! The aggregator never issues cross-kind joins itself: it asks the store
//! for union pages, union counts, and per-kind batched record fetches.

use async_trait::async_trait;
use tradepost_core::activity::{ActivityFilter, ActivityRecord, ActivityRef, EntityKind, Page};
use tradepost_core::types::DbId;
use tradepost_db::repositories::ActivityRepo;
use tradepost_db::DbPool;

/// Failure in the underlying activity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read access to the unioned activity stream and its per-kind records.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// One page of union rows, ordered by `activity_id` descending.
    async fn select_page(
        &self,
        filter: &ActivityFilter,
        page: Page,
    ) -> Result<Vec<ActivityRef>, StoreError>;

    /// Count of the un-paginated union for the same filter.
    async fn count(&self, filter: &ActivityFilter) -> Result<i64, StoreError>;

    /// Batched full-record fetch for one kind. Ids deleted since the union
    /// query are simply absent from the result.
    async fn fetch_batch(
        &self,
        kind: EntityKind,
        ids: &[DbId],
    ) -> Result<Vec<ActivityRecord>, StoreError>;

    /// Whether the filter's primary entity (user or item) exists. `Global`
    /// has no target and always exists.
    async fn filter_target_exists(&self, filter: &ActivityFilter) -> Result<bool, StoreError>;
}

/// Postgres-backed activity store.
#[derive(Clone)]
pub struct PgActivityStore {
    pool: DbPool,
}

impl PgActivityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn select_page(
        &self,
        filter: &ActivityFilter,
        page: Page,
    ) -> Result<Vec<ActivityRef>, StoreError> {
        Ok(ActivityRepo::select_page(&self.pool, filter, page).await?)
    }

    async fn count(&self, filter: &ActivityFilter) -> Result<i64, StoreError> {
        Ok(ActivityRepo::count(&self.pool, filter).await?)
    }

    async fn fetch_batch(
        &self,
        kind: EntityKind,
        ids: &[DbId],
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        Ok(ActivityRepo::fetch_batch(&self.pool, kind, ids).await?)
    }

    async fn filter_target_exists(&self, filter: &ActivityFilter) -> Result<bool, StoreError> {
        match *filter {
            ActivityFilter::Global => Ok(true),
            ActivityFilter::ByUser { user_id, .. } => {
                Ok(ActivityRepo::user_exists(&self.pool, user_id).await?)
            }
            ActivityFilter::ByItem { item_id } => {
                Ok(ActivityRepo::item_exists(&self.pool, item_id).await?)
            }
        }
    }
}
