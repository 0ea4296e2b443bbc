//! The identity cache service: TTL invalidation, batched refresh, and
//! degradation to stale data.
//!
//! Per record the lifecycle is `Absent -> Valid -> Stale -> (Valid |
//! Absent)`: valid while `cached_at >= now - TTL`, stale but still servable
//! afterwards, gone only once pruned. Refreshes overwrite the full record,
//! so concurrent refreshes of the same id are last-writer-wins.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::Utc;
use tradepost_core::identity::{expiry_boundary, IdentityRecord, PROVIDER_BATCH_LIMIT};
use tradepost_core::types::{DbId, Timestamp};

use crate::provider::IdentityProvider;
use crate::store::{IdentityStore, StoreError};

/// Stale-tolerant TTL cache in front of the identity provider.
pub struct IdentityCache<P, S> {
    provider: P,
    store: S,
    ttl: chrono::Duration,
    timeout: std::time::Duration,
}

impl<P: IdentityProvider, S: IdentityStore> IdentityCache<P, S> {
    pub fn new(provider: P, store: S, ttl: chrono::Duration, timeout: std::time::Duration) -> Self {
        Self {
            provider,
            store,
            ttl,
            timeout,
        }
    }

    /// Expiry boundary for one cache pass, computed fresh per call.
    fn boundary(&self) -> Timestamp {
        expiry_boundary(Utc::now(), self.ttl)
    }

    /// Resolve identity records for the requested ids, refreshing missing or
    /// stale entries in one batched pass.
    ///
    /// Provider failure never surfaces: ids whose refresh failed are served
    /// from whatever cached copy exists (stale included) and omitted when no
    /// copy exists at all. Result order is unspecified.
    pub async fn get_many(&self, ids: &[DbId]) -> Result<Vec<IdentityRecord>, StoreError> {
        let requested: BTreeSet<DbId> = ids.iter().copied().collect();
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let cached = self.store.get_many(ids).await?;
        let boundary = self.boundary();

        let mut by_id: BTreeMap<DbId, IdentityRecord> = cached
            .into_iter()
            .map(|record| (record.external_id, record))
            .collect();

        let needs_refresh: Vec<DbId> = requested
            .iter()
            .copied()
            .filter(|id| by_id.get(id).map_or(true, |r| !r.is_valid(boundary)))
            .collect();

        if needs_refresh.is_empty() {
            tracing::info!(count = by_id.len(), "Served identity batch from cache");
            return Ok(by_id.into_values().collect());
        }

        let started = Instant::now();
        let fresh = self.refresh_many(&needs_refresh, false).await?;
        tracing::info!(
            requested = requested.len(),
            refreshed = fresh.len(),
            missing_or_stale = needs_refresh.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Identity provider consulted for cache misses"
        );

        if fresh.is_empty() {
            tracing::warn!(
                count = by_id.len(),
                "Identity provider returned nothing usable; serving cached copies"
            );
        }
        for record in fresh {
            by_id.insert(record.external_id, record);
        }

        Ok(by_id.into_values().collect())
    }

    /// Re-fetch the given ids from the provider in batches of at most 100,
    /// overwriting cache entries per successful batch.
    ///
    /// Batches are independent: one failing batch is logged and skipped
    /// while the others commit. Returns the records actually refreshed.
    pub async fn refresh_many(
        &self,
        ids: &[DbId],
        precache: bool,
    ) -> Result<Vec<IdentityRecord>, StoreError> {
        let mut refreshed = Vec::with_capacity(ids.len());

        for batch in ids.chunks(PROVIDER_BATCH_LIMIT) {
            match self.provider.fetch_batch(batch, self.timeout).await {
                Ok(profiles) => {
                    let cached_at = Utc::now();
                    let records: Vec<IdentityRecord> = profiles
                        .into_iter()
                        .map(|p| IdentityRecord::from_profile(p, cached_at, precache))
                        .collect();
                    self.store.put_many(&records).await?;
                    refreshed.extend(records);
                }
                Err(err) => {
                    tracing::warn!(
                        batch_len = batch.len(),
                        error = %err,
                        "Identity provider batch failed; continuing with remaining batches"
                    );
                }
            }
        }

        Ok(refreshed)
    }

    // -- Maintenance surface (driven serially by an external scheduler) --

    /// Re-fetch every currently stale record. Returns how many ids were
    /// scheduled for refresh.
    pub async fn refresh_expired(&self) -> Result<usize, StoreError> {
        let stale = self.store.ids_cached_before(self.boundary()).await?;
        let count = stale.len();
        self.refresh_many(&stale, false).await?;
        Ok(count)
    }

    /// Hard-delete every stale record. Returns how many were removed.
    pub async fn prune_expired(&self) -> Result<u64, StoreError> {
        let pruned = self.store.delete_cached_before(self.boundary()).await?;
        if pruned > 0 {
            tracing::info!(pruned, "Pruned expired identity records");
        }
        Ok(pruned)
    }

    /// Force-refresh every cached id. One provider call per 100 cached ids,
    /// so use sparingly.
    pub async fn refresh_all(&self) -> Result<usize, StoreError> {
        let ids = self.store.all_ids().await?;
        let count = ids.len();
        self.refresh_many(&ids, false).await?;
        Ok(count)
    }

    /// Drop the entire cache.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        self.store.clear().await
    }

    // -- Diagnostics --

    /// Number of records still within the TTL.
    pub async fn count_valid(&self) -> Result<i64, StoreError> {
        self.store.count_cached_since(self.boundary()).await
    }

    /// Number of records past the TTL but not yet pruned.
    pub async fn count_expired(&self) -> Result<i64, StoreError> {
        self.store.count_cached_before(self.boundary()).await
    }

    /// Number of proactively warmed records.
    pub async fn count_precached(&self) -> Result<i64, StoreError> {
        self.store.count_precached().await
    }

    /// Whether one record was proactively warmed.
    pub async fn is_precached(&self, external_id: DbId) -> Result<bool, StoreError> {
        self.store.is_precached(external_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tradepost_core::identity::{is_expired, IdentityProfile};

    use crate::provider::ProviderError;

    const TTL_SECS: i64 = 3600;

    fn profile(id: DbId) -> IdentityProfile {
        IdentityProfile {
            external_id: id,
            display_name: format!("actor-{id}"),
            profile_url: format!("https://example.com/{id}"),
            avatar: "a".into(),
            avatar_medium: "m".into(),
            avatar_full: "f".into(),
        }
    }

    fn record(id: DbId, age_secs: i64) -> IdentityRecord {
        IdentityRecord::from_profile(profile(id), Utc::now() - chrono::Duration::seconds(age_secs), false)
    }

    /// In-memory store mirroring the Postgres implementation's semantics.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<BTreeMap<DbId, IdentityRecord>>,
    }

    impl MemoryStore {
        fn with(records: Vec<IdentityRecord>) -> Self {
            let store = Self::default();
            {
                let mut rows = store.rows.lock().unwrap();
                for r in records {
                    rows.insert(r.external_id, r);
                }
            }
            store
        }
    }

    #[async_trait]
    impl IdentityStore for MemoryStore {
        async fn get_many(&self, ids: &[DbId]) -> Result<Vec<IdentityRecord>, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
        }

        async fn put_many(&self, records: &[IdentityRecord]) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            for r in records {
                rows.insert(r.external_id, r.clone());
            }
            Ok(())
        }

        async fn all_ids(&self) -> Result<Vec<DbId>, StoreError> {
            Ok(self.rows.lock().unwrap().keys().copied().collect())
        }

        async fn ids_cached_before(&self, boundary: Timestamp) -> Result<Vec<DbId>, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .values()
                .filter(|r| is_expired(r.cached_at, boundary))
                .map(|r| r.external_id)
                .collect())
        }

        async fn delete_cached_before(&self, boundary: Timestamp) -> Result<u64, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, r| !is_expired(r.cached_at, boundary));
            Ok((before - rows.len()) as u64)
        }

        async fn count_cached_since(&self, boundary: Timestamp) -> Result<i64, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.values().filter(|r| !is_expired(r.cached_at, boundary)).count() as i64)
        }

        async fn count_cached_before(&self, boundary: Timestamp) -> Result<i64, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.values().filter(|r| is_expired(r.cached_at, boundary)).count() as i64)
        }

        async fn count_precached(&self) -> Result<i64, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.values().filter(|r| r.is_precached).count() as i64)
        }

        async fn is_precached(&self, external_id: DbId) -> Result<bool, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(&external_id).map_or(false, |r| r.is_precached))
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.rows.lock().unwrap().clear();
            Ok(())
        }
    }

    /// Provider fake: answers every requested id, except on call indices
    /// configured to fail. Records the batch it saw for each call.
    #[derive(Default)]
    struct FakeProvider {
        fail_calls: HashSet<usize>,
        calls: Mutex<Vec<Vec<DbId>>>,
    }

    impl FakeProvider {
        fn failing_on(calls: &[usize]) -> Self {
            Self {
                fail_calls: calls.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_sizes(&self) -> Vec<usize> {
            self.calls.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn fetch_batch(
            &self,
            ids: &[DbId],
            _timeout: Duration,
        ) -> Result<Vec<IdentityProfile>, ProviderError> {
            let call_index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(ids.to_vec());
                calls.len() - 1
            };
            if self.fail_calls.contains(&call_index) {
                return Err(ProviderError::Decode("scripted failure".into()));
            }
            Ok(ids.iter().map(|&id| profile(id)).collect())
        }
    }

    fn cache(provider: FakeProvider, store: MemoryStore) -> IdentityCache<FakeProvider, MemoryStore> {
        IdentityCache::new(
            provider,
            store,
            chrono::Duration::seconds(TTL_SECS),
            Duration::from_secs(5),
        )
    }

    // -- get_many --

    #[tokio::test]
    async fn valid_entries_skip_the_provider() {
        let cache = cache(
            FakeProvider::default(),
            MemoryStore::with(vec![record(1, 10), record(2, 10)]),
        );

        let result = cache.get_many(&[1, 2]).await.unwrap();
        assert_eq!(result.len(), 2);
        assert!(cache.provider.call_sizes().is_empty());
    }

    #[tokio::test]
    async fn missing_entries_are_fetched_and_cached() {
        let cache = cache(FakeProvider::default(), MemoryStore::default());

        let result = cache.get_many(&[5]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].display_name, "actor-5");
        assert!(!result[0].is_precached);
        assert_eq!(cache.provider.call_sizes(), vec![1]);

        // Second lookup is a pure cache hit.
        cache.get_many(&[5]).await.unwrap();
        assert_eq!(cache.provider.call_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn stale_entry_is_replaced_by_refresh() {
        let cache = cache(
            FakeProvider::default(),
            MemoryStore::with(vec![record(1, TTL_SECS + 100)]),
        );

        let result = cache.get_many(&[1]).await.unwrap();
        assert_eq!(result.len(), 1);
        let boundary = expiry_boundary(Utc::now(), chrono::Duration::seconds(TTL_SECS));
        assert!(result[0].is_valid(boundary));
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_stale_and_omits_unknown() {
        // A has a stale copy, B has nothing cached.
        let cache = cache(
            FakeProvider::failing_on(&[0]),
            MemoryStore::with(vec![record(1, TTL_SECS + 100)]),
        );

        let result = cache.get_many(&[1, 2]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].external_id, 1);
    }

    #[tokio::test]
    async fn empty_request_is_a_no_op() {
        let cache = cache(FakeProvider::default(), MemoryStore::default());
        assert!(cache.get_many(&[]).await.unwrap().is_empty());
        assert!(cache.provider.call_sizes().is_empty());
    }

    // -- refresh_many --

    #[tokio::test]
    async fn refresh_splits_into_provider_sized_batches() {
        let ids: Vec<DbId> = (0..250).collect();
        let cache = cache(FakeProvider::default(), MemoryStore::default());

        let refreshed = cache.refresh_many(&ids, false).await.unwrap();
        assert_eq!(refreshed.len(), 250);
        assert_eq!(cache.provider.call_sizes(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn failed_batch_does_not_block_others() {
        let ids: Vec<DbId> = (0..250).collect();
        let cache = cache(FakeProvider::failing_on(&[1]), MemoryStore::default());

        let refreshed = cache.refresh_many(&ids, false).await.unwrap();
        assert_eq!(refreshed.len(), 150);

        // Batches 1 and 3 committed; the middle batch did not.
        let cached = cache.store.get_many(&ids).await.unwrap();
        let cached_ids: HashSet<DbId> = cached.iter().map(|r| r.external_id).collect();
        assert!(cached_ids.contains(&0) && cached_ids.contains(&99));
        assert!(!cached_ids.contains(&100) && !cached_ids.contains(&199));
        assert!(cached_ids.contains(&200) && cached_ids.contains(&249));
    }

    #[tokio::test]
    async fn precache_flag_is_stamped() {
        let cache = cache(FakeProvider::default(), MemoryStore::default());

        cache.refresh_many(&[7], true).await.unwrap();
        assert!(cache.is_precached(7).await.unwrap());
        assert_eq!(cache.count_precached().await.unwrap(), 1);
    }

    // -- maintenance --

    #[tokio::test]
    async fn refresh_expired_targets_only_stale_records() {
        let cache = cache(
            FakeProvider::default(),
            MemoryStore::with(vec![record(1, 10), record(2, TTL_SECS + 100)]),
        );

        let scheduled = cache.refresh_expired().await.unwrap();
        assert_eq!(scheduled, 1);
        assert_eq!(cache.provider.calls.lock().unwrap()[0], vec![2]);
    }

    #[tokio::test]
    async fn prune_expired_removes_only_stale_records() {
        let cache = cache(
            FakeProvider::default(),
            MemoryStore::with(vec![record(1, 10), record(2, TTL_SECS + 100)]),
        );

        assert_eq!(cache.prune_expired().await.unwrap(), 1);
        assert_eq!(cache.count_valid().await.unwrap(), 1);
        assert_eq!(cache.count_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn refresh_all_covers_every_cached_id() {
        let cache = cache(
            FakeProvider::default(),
            MemoryStore::with(vec![record(1, 10), record(2, TTL_SECS + 100)]),
        );

        assert_eq!(cache.refresh_all().await.unwrap(), 2);
        assert_eq!(cache.provider.call_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn clear_all_empties_the_cache() {
        let cache = cache(
            FakeProvider::default(),
            MemoryStore::with(vec![record(1, 10)]),
        );

        cache.clear_all().await.unwrap();
        assert_eq!(cache.count_valid().await.unwrap(), 0);
        assert_eq!(cache.count_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn is_precached_false_for_missing_record() {
        let cache = cache(FakeProvider::default(), MemoryStore::default());
        assert!(!cache.is_precached(42).await.unwrap());
    }
}
