//! Feed façade: aggregator output decorated with identity data.
//!
//! The façade is pure composition. Its one obligation beyond glue is making
//! at most a single identity-cache round trip per page, however many records
//! and roles reference actors.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tradepost_core::activity::{ActivityFilter, NormalizedActivity, Page};
use tradepost_core::error::CoreError;
use tradepost_core::identity::IdentityRecord;
use tradepost_core::types::DbId;
use tradepost_identity::{IdentityCache, IdentityProvider, IdentityStore};

use crate::aggregator::ActivityAggregator;
use crate::error::FeedResult;
use crate::store::ActivityStore;

/// A normalized activity plus resolved actor display data. Actors the cache
/// could not resolve are absent from the map; callers treat missing entries
/// as "unknown actor", never as an error.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedActivity {
    #[serde(flatten)]
    pub activity: NormalizedActivity,
    pub actors: BTreeMap<DbId, IdentityRecord>,
}

/// One page of the decorated feed, with the pagination window echoed back.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub activities: Vec<EnrichedActivity>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

/// Composes the activity aggregator with the identity cache.
pub struct FeedService<S, P, C> {
    aggregator: ActivityAggregator<S>,
    identities: IdentityCache<P, C>,
}

impl<S, P, C> FeedService<S, P, C>
where
    S: ActivityStore,
    P: IdentityProvider,
    C: IdentityStore,
{
    pub fn new(store: S, identities: IdentityCache<P, C>) -> Self {
        Self {
            aggregator: ActivityAggregator::new(store),
            identities,
        }
    }

    /// Produce one decorated feed page.
    ///
    /// Surfaces `NotFound` when the filter targets a user or item that does
    /// not exist; every identity-side failure degrades to records without
    /// actor data.
    pub async fn feed_page(&self, filter: &ActivityFilter, page: Page) -> FeedResult<FeedPage> {
        self.ensure_filter_target(filter).await?;

        let (refs, total) = self.aggregator.query(filter, page).await?;
        let activities = self.aggregator.hydrate(&refs).await?;
        let actors = self.resolve_actors(&activities).await;

        let activities = activities
            .into_iter()
            .map(|activity| {
                let actor_ids = activity.record.actor_ids();
                let actors = actor_ids
                    .into_iter()
                    .filter_map(|id| actors.get(&id).map(|r| (id, r.clone())))
                    .collect();
                EnrichedActivity { activity, actors }
            })
            .collect();

        Ok(FeedPage {
            activities,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn ensure_filter_target(&self, filter: &ActivityFilter) -> FeedResult<()> {
        let (entity, id) = match *filter {
            // The global feed has no target to verify.
            ActivityFilter::Global => return Ok(()),
            ActivityFilter::ByUser { user_id, .. } => ("User", user_id),
            ActivityFilter::ByItem { item_id } => ("Item", item_id),
        };
        if !self.aggregator.store().filter_target_exists(filter).await? {
            return Err(CoreError::not_found(entity, id).into());
        }
        Ok(())
    }

    /// One identity-cache round trip for every actor referenced by the page.
    async fn resolve_actors(
        &self,
        activities: &[NormalizedActivity],
    ) -> BTreeMap<DbId, IdentityRecord> {
        let actor_ids: BTreeSet<DbId> = activities
            .iter()
            .flat_map(|a| a.record.actor_ids())
            .collect();
        if actor_ids.is_empty() {
            return BTreeMap::new();
        }

        let ids: Vec<DbId> = actor_ids.into_iter().collect();
        match self.identities.get_many(&ids).await {
            Ok(records) => records.into_iter().map(|r| (r.external_id, r)).collect(),
            Err(err) => {
                // Identity trouble never fails a feed render.
                tracing::warn!(error = %err, "Identity lookup failed; rendering without actor data");
                BTreeMap::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
