//! Repository for the `identity_cache` table.
//!
//! Rows are keyed by the actor's stable external id and fully replaced on
//! every refresh; `cached_at` drives all expiry comparisons. Expiry
//! boundaries are computed by the caller so a whole cache pass shares one
//! consistent instant.

use sqlx::PgPool;
use tradepost_core::identity::IdentityRecord;
use tradepost_core::types::{DbId, Timestamp};

use crate::models::identity::IdentityCacheRow;

/// Column list for `identity_cache` queries.
const COLUMNS: &str = "external_id, display_name, profile_url, avatar, avatar_medium, \
                       avatar_full, cached_at, is_precached";

/// Provides storage operations for cached identity records.
pub struct IdentityCacheRepo;

impl IdentityCacheRepo {
    /// Fetch whatever cached copies exist for the requested ids, fresh or
    /// stale. Freshness partitioning happens in the cache service.
    pub async fn get_many(pool: &PgPool, ids: &[DbId]) -> Result<Vec<IdentityCacheRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM identity_cache WHERE external_id = ANY($1)");
        sqlx::query_as::<_, IdentityCacheRow>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Upsert records one row at a time, replacing the full row on conflict.
    ///
    /// Writes are intentionally non-atomic across records: each row commits
    /// independently, matching the batch-isolation semantics of refreshes.
    pub async fn put_many(pool: &PgPool, records: &[IdentityRecord]) -> Result<(), sqlx::Error> {
        for record in records {
            sqlx::query(
                "INSERT INTO identity_cache \
                 (external_id, display_name, profile_url, avatar, avatar_medium, avatar_full, \
                  cached_at, is_precached) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (external_id) DO UPDATE SET \
                   display_name = EXCLUDED.display_name, \
                   profile_url = EXCLUDED.profile_url, \
                   avatar = EXCLUDED.avatar, \
                   avatar_medium = EXCLUDED.avatar_medium, \
                   avatar_full = EXCLUDED.avatar_full, \
                   cached_at = EXCLUDED.cached_at, \
                   is_precached = EXCLUDED.is_precached",
            )
            .bind(record.external_id)
            .bind(&record.display_name)
            .bind(&record.profile_url)
            .bind(&record.avatar)
            .bind(&record.avatar_medium)
            .bind(&record.avatar_full)
            .bind(record.cached_at)
            .bind(record.is_precached)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Every external id currently cached.
    pub async fn all_ids(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT external_id FROM identity_cache")
            .fetch_all(pool)
            .await
    }

    /// Ids of records cached strictly before the boundary (stale entries).
    pub async fn ids_cached_before(
        pool: &PgPool,
        boundary: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT external_id FROM identity_cache WHERE cached_at < $1")
            .bind(boundary)
            .fetch_all(pool)
            .await
    }

    /// Hard-delete records cached strictly before the boundary. Returns the
    /// number of rows removed.
    pub async fn delete_cached_before(
        pool: &PgPool,
        boundary: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM identity_cache WHERE cached_at < $1")
            .bind(boundary)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of records still valid at the boundary.
    pub async fn count_cached_since(pool: &PgPool, boundary: Timestamp) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM identity_cache WHERE cached_at >= $1")
            .bind(boundary)
            .fetch_one(pool)
            .await
    }

    /// Number of records expired at the boundary.
    pub async fn count_cached_before(pool: &PgPool, boundary: Timestamp) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM identity_cache WHERE cached_at < $1")
            .bind(boundary)
            .fetch_one(pool)
            .await
    }

    /// Number of proactively warmed records.
    pub async fn count_precached(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM identity_cache WHERE is_precached = TRUE")
            .fetch_one(pool)
            .await
    }

    /// Whether the record for `external_id` was proactively warmed. Missing
    /// records report `false`.
    pub async fn is_precached(pool: &PgPool, external_id: DbId) -> Result<bool, sqlx::Error> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT is_precached FROM identity_cache WHERE external_id = $1")
                .bind(external_id)
                .fetch_optional(pool)
                .await?;
        Ok(flag.unwrap_or(false))
    }

    /// Drop every cached record.
    pub async fn clear(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("TRUNCATE identity_cache").execute(pool).await?;
        Ok(())
    }
}
