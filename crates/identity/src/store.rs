//! Storage contract for cached identity records, plus the Postgres
//! implementation over [`IdentityCacheRepo`].

use async_trait::async_trait;
use tradepost_core::identity::IdentityRecord;
use tradepost_core::types::{DbId, Timestamp};
use tradepost_db::repositories::IdentityCacheRepo;
use tradepost_db::DbPool;

/// Failure in the cache's own storage. Unlike provider failures these are
/// internal faults and do propagate to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence operations the identity cache needs. Expiry boundaries are
/// passed in by the service so a whole pass compares against one instant.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Cached copies for the requested ids, fresh or stale.
    async fn get_many(&self, ids: &[DbId]) -> Result<Vec<IdentityRecord>, StoreError>;

    /// Full-record upsert; each record commits independently.
    async fn put_many(&self, records: &[IdentityRecord]) -> Result<(), StoreError>;

    /// Every cached external id.
    async fn all_ids(&self) -> Result<Vec<DbId>, StoreError>;

    /// Ids cached strictly before the boundary.
    async fn ids_cached_before(&self, boundary: Timestamp) -> Result<Vec<DbId>, StoreError>;

    /// Delete records cached strictly before the boundary; returns how many.
    async fn delete_cached_before(&self, boundary: Timestamp) -> Result<u64, StoreError>;

    /// Count of records still valid at the boundary.
    async fn count_cached_since(&self, boundary: Timestamp) -> Result<i64, StoreError>;

    /// Count of records expired at the boundary.
    async fn count_cached_before(&self, boundary: Timestamp) -> Result<i64, StoreError>;

    /// Count of proactively warmed records.
    async fn count_precached(&self) -> Result<i64, StoreError>;

    /// Whether one record was proactively warmed; missing records are `false`.
    async fn is_precached(&self, external_id: DbId) -> Result<bool, StoreError>;

    /// Drop everything.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Postgres-backed identity store.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: DbPool,
}

impl PgIdentityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn get_many(&self, ids: &[DbId]) -> Result<Vec<IdentityRecord>, StoreError> {
        let rows = IdentityCacheRepo::get_many(&self.pool, ids).await?;
        Ok(rows.into_iter().map(IdentityRecord::from).collect())
    }

    async fn put_many(&self, records: &[IdentityRecord]) -> Result<(), StoreError> {
        IdentityCacheRepo::put_many(&self.pool, records).await?;
        Ok(())
    }

    async fn all_ids(&self) -> Result<Vec<DbId>, StoreError> {
        Ok(IdentityCacheRepo::all_ids(&self.pool).await?)
    }

    async fn ids_cached_before(&self, boundary: Timestamp) -> Result<Vec<DbId>, StoreError> {
        Ok(IdentityCacheRepo::ids_cached_before(&self.pool, boundary).await?)
    }

    async fn delete_cached_before(&self, boundary: Timestamp) -> Result<u64, StoreError> {
        Ok(IdentityCacheRepo::delete_cached_before(&self.pool, boundary).await?)
    }

    async fn count_cached_since(&self, boundary: Timestamp) -> Result<i64, StoreError> {
        Ok(IdentityCacheRepo::count_cached_since(&self.pool, boundary).await?)
    }

    async fn count_cached_before(&self, boundary: Timestamp) -> Result<i64, StoreError> {
        Ok(IdentityCacheRepo::count_cached_before(&self.pool, boundary).await?)
    }

    async fn count_precached(&self) -> Result<i64, StoreError> {
        Ok(IdentityCacheRepo::count_precached(&self.pool).await?)
    }

    async fn is_precached(&self, external_id: DbId) -> Result<bool, StoreError> {
        Ok(IdentityCacheRepo::is_precached(&self.pool, external_id).await?)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(IdentityCacheRepo::clear(&self.pool).await?)
    }
}
