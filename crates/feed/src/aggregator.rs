//! Union paging and hydration over the entity store.

use std::collections::BTreeMap;

use tradepost_core::activity::{
    normalize, ActivityFilter, ActivityRef, EntityKind, NormalizedActivity, Page,
};
use tradepost_core::types::DbId;

use crate::store::{ActivityStore, StoreError};

/// Builds the unioned, ordered, paginated activity stream and hydrates
/// pages into normalized records.
pub struct ActivityAggregator<S> {
    store: S,
}

impl<S: ActivityStore> ActivityAggregator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch one page of union rows plus the total count of the same union.
    ///
    /// The count deliberately comes from the union itself, never from
    /// summing per-kind counts, so page math and the total cannot drift.
    pub async fn query(
        &self,
        filter: &ActivityFilter,
        page: Page,
    ) -> Result<(Vec<ActivityRef>, i64), StoreError> {
        let refs = self.store.select_page(filter, page).await?;
        let total = self.store.count(filter).await?;
        Ok((refs, total))
    }

    /// Hydrate a page of union rows into normalized activities.
    ///
    /// Ids are grouped by kind and fetched with one batched call per kind
    /// present, so hydration costs at most one fetch per kind regardless of
    /// page size. Records that vanished between the union query and the
    /// fetch are dropped silently: the feed favors availability over strict
    /// consistency. The result is re-sorted by display date, which may
    /// disagree with the id order used for pagination.
    pub async fn hydrate(
        &self,
        refs: &[ActivityRef],
    ) -> Result<Vec<NormalizedActivity>, StoreError> {
        let mut ids_by_kind: BTreeMap<EntityKind, Vec<DbId>> = BTreeMap::new();
        for r in refs {
            ids_by_kind.entry(r.kind).or_default().push(r.activity_id);
        }

        let mut hydrated = Vec::with_capacity(refs.len());
        for (kind, ids) in &ids_by_kind {
            let records = self.store.fetch_batch(*kind, ids).await?;
            if records.len() < ids.len() {
                tracing::debug!(
                    kind = kind.as_str(),
                    requested = ids.len(),
                    found = records.len(),
                    "Dropping activity records missing at hydration time"
                );
            }
            hydrated.extend(records.into_iter().map(normalize));
        }

        // Display order: newest date first, id as the deterministic tie-break.
        hydrated.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then(b.activity_id.cmp(&a.activity_id))
        });
        Ok(hydrated)
    }
}
