//! Row model for the `identity_cache` table.

use serde::Serialize;
use sqlx::FromRow;
use tradepost_core::identity::IdentityRecord;
use tradepost_core::types::{DbId, Timestamp};

/// A row from `identity_cache`. One row per external actor; refreshes
/// overwrite the full row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct IdentityCacheRow {
    pub external_id: DbId,
    pub display_name: String,
    pub profile_url: String,
    pub avatar: String,
    pub avatar_medium: String,
    pub avatar_full: String,
    pub cached_at: Timestamp,
    pub is_precached: bool,
}

impl From<IdentityCacheRow> for IdentityRecord {
    fn from(row: IdentityCacheRow) -> Self {
        IdentityRecord {
            external_id: row.external_id,
            display_name: row.display_name,
            profile_url: row.profile_url,
            avatar: row.avatar,
            avatar_medium: row.avatar_medium,
            avatar_full: row.avatar_full,
            cached_at: row.cached_at,
            is_precached: row.is_precached,
        }
    }
}
