//! Identity-cache domain types and freshness math.
//!
//! A cached identity record moves through `Absent -> Valid -> Stale` as its
//! `cached_at` ages past the configured TTL. Stale records remain servable as
//! a fallback until explicitly pruned. All comparisons happen against an
//! expiry boundary computed once per call, never against process-wide state.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// The identity provider accepts at most this many ids per call.
pub const PROVIDER_BATCH_LIMIT: usize = 100;

/// Actor profile as returned by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub external_id: DbId,
    pub display_name: String,
    pub profile_url: String,
    pub avatar: String,
    pub avatar_medium: String,
    pub avatar_full: String,
}

/// Cached snapshot of an external actor. Created or fully overwritten on
/// every successful fetch; never partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub external_id: DbId,
    pub display_name: String,
    pub profile_url: String,
    pub avatar: String,
    pub avatar_medium: String,
    pub avatar_full: String,
    pub cached_at: Timestamp,
    /// Whether this entry was warmed proactively rather than fetched on
    /// demand.
    pub is_precached: bool,
}

impl IdentityRecord {
    /// Stamp a provider profile into a cache record.
    pub fn from_profile(profile: IdentityProfile, cached_at: Timestamp, precached: bool) -> Self {
        Self {
            external_id: profile.external_id,
            display_name: profile.display_name,
            profile_url: profile.profile_url,
            avatar: profile.avatar,
            avatar_medium: profile.avatar_medium,
            avatar_full: profile.avatar_full,
            cached_at,
            is_precached: precached,
        }
    }

    /// Whether this record is still valid against the given boundary.
    pub fn is_valid(&self, boundary: Timestamp) -> bool {
        !is_expired(self.cached_at, boundary)
    }
}

/// Expiry boundary for a cache pass: records cached strictly before this
/// instant are stale.
pub fn expiry_boundary(now: Timestamp, ttl: Duration) -> Timestamp {
    now - ttl
}

/// A record cached exactly at the boundary is still valid; only strictly
/// older entries expire.
pub fn is_expired(cached_at: Timestamp, boundary: Timestamp) -> bool {
    cached_at < boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(cached_at: Timestamp) -> IdentityRecord {
        IdentityRecord::from_profile(
            IdentityProfile {
                external_id: 1,
                display_name: "actor".into(),
                profile_url: "https://example.com/1".into(),
                avatar: "a".into(),
                avatar_medium: "m".into(),
                avatar_full: "f".into(),
            },
            cached_at,
            false,
        )
    }

    #[test]
    fn valid_just_inside_ttl() {
        let ttl = Duration::seconds(3600);
        let fetched = at(0);
        let boundary = expiry_boundary(at(3600 - 1), ttl);
        assert!(record(fetched).is_valid(boundary));
    }

    #[test]
    fn stale_just_past_ttl() {
        let ttl = Duration::seconds(3600);
        let fetched = at(0);
        let boundary = expiry_boundary(at(3600 + 1), ttl);
        assert!(!record(fetched).is_valid(boundary));
    }

    #[test]
    fn boundary_equality_is_valid() {
        let ttl = Duration::seconds(3600);
        let fetched = at(0);
        let boundary = expiry_boundary(at(3600), ttl);
        assert_eq!(boundary, fetched);
        assert!(record(fetched).is_valid(boundary));
    }

    #[test]
    fn from_profile_stamps_metadata() {
        let rec = record(at(5));
        assert_eq!(rec.cached_at, at(5));
        assert!(!rec.is_precached);
        assert_eq!(rec.display_name, "actor");
    }
}
