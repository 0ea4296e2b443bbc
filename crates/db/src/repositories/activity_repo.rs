//! Repository for the cross-kind activity union.
//!
//! Each filter composes one member select per participating kind, projecting
//! `(native_id AS activity_id, '<Kind>' AS kind)`, concatenated with
//! `UNION ALL` and ordered by `activity_id DESC`. Ids are assigned from a
//! single sequence shared across kinds, so the concatenation is duplicate
//! free and the count is taken over the same union the page comes from.
//!
//! Filters bind at most one value (`$1` = user or item id); the anonymous
//! gift clause is toggled in SQL text, not bound.

use std::collections::BTreeMap;

use sqlx::PgPool;
use tradepost_core::activity::{
    ActivityFilter, ActivityRecord, ActivityRef, DetailLine, EntityKind, GiftActivity,
    GiveawayClaimActivity, LiquidationActivity, OrderActivity, Page, PaypalOrderActivity,
    RewardActivity, ReviewActivity, ShipmentActivity,
};
use tradepost_core::types::DbId;

use crate::models::activity::{
    GiftLineRow, GiveawayClaimLineRow, LiquidationLineRow, OrderLineRow, PaypalOrderRow,
    RewardLineRow, RewardRecipientRow, ReviewRow, ShipmentLineRow,
};

/// Queries over the unioned activity stream.
pub struct ActivityRepo;

// ---------------------------------------------------------------------------
// Union construction
// ---------------------------------------------------------------------------

/// Member select for one kind under one filter. `None` when the kind does
/// not participate in that filter's union.
fn member_sql(kind: EntityKind, filter: &ActivityFilter) -> Option<String> {
    if !filter.kinds().contains(&kind) {
        return None;
    }

    let tag = kind.as_str();
    let sql = match filter {
        ActivityFilter::Global => {
            let (id_col, table) = match kind {
                EntityKind::Order => ("order_id", "orders"),
                EntityKind::Liquidation => ("liquidation_id", "liquidations"),
                EntityKind::PaypalOrder => ("paypal_order_id", "paypal_orders"),
                EntityKind::Gift => ("gift_id", "gifts"),
                EntityKind::Reward => ("reward_id", "rewards"),
                EntityKind::Review => ("review_id", "reviews"),
                EntityKind::Shipment => ("shipment_id", "shipments"),
                EntityKind::GiveawayClaim => ("giveaway_claim_id", "giveaway_claims"),
            };
            format!("SELECT {id_col} AS activity_id, '{tag}' AS kind FROM {table}")
        }

        ActivityFilter::ByUser {
            include_anonymous_gift_senders,
            ..
        } => match kind {
            EntityKind::Order => {
                format!("SELECT order_id AS activity_id, '{tag}' AS kind FROM orders WHERE user_id = $1")
            }
            EntityKind::Liquidation => format!(
                "SELECT liquidation_id AS activity_id, '{tag}' AS kind FROM liquidations WHERE user_id = $1"
            ),
            EntityKind::PaypalOrder => format!(
                "SELECT paypal_order_id AS activity_id, '{tag}' AS kind FROM paypal_orders WHERE user_id = $1"
            ),
            EntityKind::Gift => {
                // Recipients always see the gift; anonymous senders only see
                // their own when explicitly allowed.
                let sender_clause = if *include_anonymous_gift_senders {
                    "sender_id = $1"
                } else {
                    "(sender_id = $1 AND anonymous = FALSE)"
                };
                format!(
                    "SELECT gift_id AS activity_id, '{tag}' AS kind FROM gifts \
                     WHERE recipient_id = $1 OR {sender_clause}"
                )
            }
            EntityKind::Reward => format!(
                "SELECT reward_id AS activity_id, '{tag}' AS kind FROM reward_recipients WHERE recipient_id = $1"
            ),
            EntityKind::Review => format!(
                "SELECT r.review_id AS activity_id, '{tag}' AS kind FROM reviews r \
                 JOIN ratings rt ON rt.rating_id = r.rating_id WHERE rt.user_id = $1"
            ),
            EntityKind::GiveawayClaim => format!(
                "SELECT giveaway_claim_id AS activity_id, '{tag}' AS kind FROM giveaway_claims WHERE user_id = $1"
            ),
            EntityKind::Shipment => unreachable!("shipments do not participate in user feeds"),
        },

        ActivityFilter::ByItem { .. } => match kind {
            EntityKind::Order => format!(
                "SELECT DISTINCT o.order_id AS activity_id, '{tag}' AS kind FROM orders o \
                 JOIN order_details d ON d.order_id = o.order_id WHERE d.item_id = $1"
            ),
            EntityKind::Liquidation => format!(
                "SELECT DISTINCT l.liquidation_id AS activity_id, '{tag}' AS kind FROM liquidations l \
                 JOIN liquidation_details d ON d.liquidation_id = l.liquidation_id WHERE d.item_id = $1"
            ),
            EntityKind::Gift => format!(
                "SELECT DISTINCT g.gift_id AS activity_id, '{tag}' AS kind FROM gifts g \
                 JOIN gift_details d ON d.gift_id = g.gift_id WHERE d.item_id = $1"
            ),
            EntityKind::Reward => format!(
                "SELECT DISTINCT r.reward_id AS activity_id, '{tag}' AS kind FROM rewards r \
                 JOIN reward_details d ON d.reward_id = r.reward_id WHERE d.item_id = $1"
            ),
            EntityKind::Review => format!(
                "SELECT r.review_id AS activity_id, '{tag}' AS kind FROM reviews r \
                 JOIN ratings rt ON rt.rating_id = r.rating_id WHERE rt.item_id = $1"
            ),
            EntityKind::Shipment => format!(
                "SELECT DISTINCT s.shipment_id AS activity_id, '{tag}' AS kind FROM shipments s \
                 JOIN shipment_details d ON d.shipment_id = s.shipment_id WHERE d.item_id = $1"
            ),
            EntityKind::GiveawayClaim => format!(
                "SELECT DISTINCT c.giveaway_claim_id AS activity_id, '{tag}' AS kind FROM giveaway_claims c \
                 JOIN giveaway_claim_details d ON d.giveaway_claim_id = c.giveaway_claim_id \
                 WHERE d.item_id = $1"
            ),
            EntityKind::PaypalOrder => {
                unreachable!("paypal orders do not participate in item feeds")
            }
        },
    };

    Some(sql)
}

/// The full un-paginated union for a filter.
fn union_sql(filter: &ActivityFilter) -> String {
    let members: Vec<String> = EntityKind::ALL
        .iter()
        .filter_map(|&kind| member_sql(kind, filter))
        .collect();
    members.join(" UNION ALL ")
}

/// Page query over the union. Limit/offset placeholders follow the filter
/// bind, if any.
fn page_sql(filter: &ActivityFilter) -> String {
    let (limit_ph, offset_ph) = match filter {
        ActivityFilter::Global => ("$1", "$2"),
        _ => ("$2", "$3"),
    };
    format!(
        "SELECT activity_id, kind FROM ({}) AS activity \
         ORDER BY activity_id DESC LIMIT {limit_ph} OFFSET {offset_ph}",
        union_sql(filter)
    )
}

/// Count over the same union the page is drawn from. Never summed per kind:
/// the union is the single source of truth.
fn count_sql(filter: &ActivityFilter) -> String {
    format!("SELECT COUNT(*) FROM ({}) AS activity", union_sql(filter))
}

fn filter_bind(filter: &ActivityFilter) -> Option<DbId> {
    match *filter {
        ActivityFilter::Global => None,
        ActivityFilter::ByUser { user_id, .. } => Some(user_id),
        ActivityFilter::ByItem { item_id } => Some(item_id),
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl ActivityRepo {
    /// Allocate the next global activity id for a new record of `kind`.
    ///
    /// Backed by the `new_activity()` SQL function, which inserts into the
    /// shared `activity` ledger and returns the generated id.
    pub async fn allocate_id(pool: &PgPool, kind: EntityKind) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT new_activity($1)")
            .bind(kind.as_str())
            .fetch_one(pool)
            .await
    }

    /// Fetch one page of `(activity_id, kind)` union rows, newest first.
    pub async fn select_page(
        pool: &PgPool,
        filter: &ActivityFilter,
        page: Page,
    ) -> Result<Vec<ActivityRef>, sqlx::Error> {
        let sql = page_sql(filter);
        let mut query = sqlx::query_as::<_, (DbId, String)>(&sql);
        if let Some(id) = filter_bind(filter) {
            query = query.bind(id);
        }
        let rows = query.bind(page.limit).bind(page.offset).fetch_all(pool).await?;

        rows.into_iter()
            .map(|(activity_id, tag)| {
                let kind = EntityKind::from_str(&tag)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(ActivityRef { activity_id, kind })
            })
            .collect()
    }

    /// Count the un-paginated union for a filter.
    pub async fn count(pool: &PgPool, filter: &ActivityFilter) -> Result<i64, sqlx::Error> {
        let sql = count_sql(filter);
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(id) = filter_bind(filter) {
            query = query.bind(id);
        }
        query.fetch_one(pool).await
    }

    /// Whether a user row exists (for surfacing NotFound on user feeds).
    pub async fn user_exists(pool: &PgPool, user_id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE user_id = $1)")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Whether an item row exists (for surfacing NotFound on item feeds).
    pub async fn item_exists(pool: &PgPool, item_id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE item_id = $1)")
            .bind(item_id)
            .fetch_one(pool)
            .await
    }

    /// Batched full-record fetch for one kind. One joined query per kind
    /// (rewards issue a second for their recipient list), so hydrating a page
    /// costs at most one fetch per kind present regardless of page size.
    pub async fn fetch_batch(
        pool: &PgPool,
        kind: EntityKind,
        ids: &[DbId],
    ) -> Result<Vec<ActivityRecord>, sqlx::Error> {
        match kind {
            EntityKind::Order => fetch_orders(pool, ids).await,
            EntityKind::Liquidation => fetch_liquidations(pool, ids).await,
            EntityKind::PaypalOrder => fetch_paypal_orders(pool, ids).await,
            EntityKind::Gift => fetch_gifts(pool, ids).await,
            EntityKind::Reward => fetch_rewards(pool, ids).await,
            EntityKind::Review => fetch_reviews(pool, ids).await,
            EntityKind::Shipment => fetch_shipments(pool, ids).await,
            EntityKind::GiveawayClaim => fetch_giveaway_claims(pool, ids).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind hydration
// ---------------------------------------------------------------------------

fn push_line(details: &mut Vec<DetailLine>, item_id: Option<DbId>, quantity: Option<f64>, price: Option<f64>) {
    if let (Some(item_id), Some(quantity)) = (item_id, quantity) {
        details.push(DetailLine {
            item_id,
            quantity,
            unit_price: price,
        });
    }
}

async fn fetch_orders(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ActivityRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, OrderLineRow>(
        "SELECT o.order_id, o.user_id, o.date, d.item_id, d.quantity, d.price \
         FROM orders o LEFT JOIN order_details d ON d.order_id = o.order_id \
         WHERE o.order_id = ANY($1) ORDER BY o.order_id",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<DbId, OrderActivity> = BTreeMap::new();
    for row in rows {
        let entry = grouped.entry(row.order_id).or_insert_with(|| OrderActivity {
            order_id: row.order_id,
            user_id: row.user_id,
            date: row.date,
            details: Vec::new(),
        });
        push_line(&mut entry.details, row.item_id, row.quantity, row.price);
    }
    Ok(grouped.into_values().map(ActivityRecord::Order).collect())
}

async fn fetch_liquidations(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ActivityRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LiquidationLineRow>(
        "SELECT l.liquidation_id, l.user_id, l.date, d.item_id, d.quantity, d.price \
         FROM liquidations l LEFT JOIN liquidation_details d ON d.liquidation_id = l.liquidation_id \
         WHERE l.liquidation_id = ANY($1) ORDER BY l.liquidation_id",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<DbId, LiquidationActivity> = BTreeMap::new();
    for row in rows {
        let entry = grouped
            .entry(row.liquidation_id)
            .or_insert_with(|| LiquidationActivity {
                liquidation_id: row.liquidation_id,
                user_id: row.user_id,
                date: row.date,
                details: Vec::new(),
            });
        push_line(&mut entry.details, row.item_id, row.quantity, row.price);
    }
    Ok(grouped
        .into_values()
        .map(ActivityRecord::Liquidation)
        .collect())
}

async fn fetch_paypal_orders(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ActivityRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaypalOrderRow>(
        "SELECT paypal_order_id, user_id, date, amount, credit \
         FROM paypal_orders WHERE paypal_order_id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            ActivityRecord::PaypalOrder(PaypalOrderActivity {
                paypal_order_id: row.paypal_order_id,
                user_id: row.user_id,
                date: row.date,
                amount: row.amount,
                credit: row.credit,
            })
        })
        .collect())
}

async fn fetch_gifts(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ActivityRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, GiftLineRow>(
        "SELECT g.gift_id, g.sender_id, g.recipient_id, g.anonymous, g.message, g.date, \
                d.item_id, d.quantity \
         FROM gifts g LEFT JOIN gift_details d ON d.gift_id = g.gift_id \
         WHERE g.gift_id = ANY($1) ORDER BY g.gift_id",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<DbId, GiftActivity> = BTreeMap::new();
    for row in rows {
        let entry = grouped.entry(row.gift_id).or_insert_with(|| GiftActivity {
            gift_id: row.gift_id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            anonymous: row.anonymous,
            message: row.message.clone(),
            date: row.date,
            details: Vec::new(),
        });
        push_line(&mut entry.details, row.item_id, row.quantity, None);
    }
    Ok(grouped.into_values().map(ActivityRecord::Gift).collect())
}

async fn fetch_rewards(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ActivityRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RewardLineRow>(
        "SELECT r.reward_id, r.credit, r.date, d.item_id, d.quantity \
         FROM rewards r LEFT JOIN reward_details d ON d.reward_id = r.reward_id \
         WHERE r.reward_id = ANY($1) ORDER BY r.reward_id",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let recipients = sqlx::query_as::<_, RewardRecipientRow>(
        "SELECT reward_id, recipient_id FROM reward_recipients \
         WHERE reward_id = ANY($1) ORDER BY reward_id, recipient_id",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<DbId, RewardActivity> = BTreeMap::new();
    for row in rows {
        let entry = grouped.entry(row.reward_id).or_insert_with(|| RewardActivity {
            reward_id: row.reward_id,
            credit: row.credit,
            date: row.date,
            recipient_ids: Vec::new(),
            details: Vec::new(),
        });
        push_line(&mut entry.details, row.item_id, row.quantity, None);
    }
    for row in recipients {
        if let Some(entry) = grouped.get_mut(&row.reward_id) {
            entry.recipient_ids.push(row.recipient_id);
        }
    }
    Ok(grouped.into_values().map(ActivityRecord::Reward).collect())
}

async fn fetch_reviews(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ActivityRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ReviewRow>(
        "SELECT r.review_id, r.rating_id, rt.item_id, rt.user_id, rt.rating, r.created, r.content \
         FROM reviews r JOIN ratings rt ON rt.rating_id = r.rating_id \
         WHERE r.review_id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            ActivityRecord::Review(ReviewActivity {
                review_id: row.review_id,
                rating_id: row.rating_id,
                item_id: row.item_id,
                user_id: row.user_id,
                rating: row.rating,
                created: row.created,
                content: row.content,
            })
        })
        .collect())
}

async fn fetch_shipments(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ActivityRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ShipmentLineRow>(
        "SELECT s.shipment_id, s.date, d.item_id, d.quantity \
         FROM shipments s LEFT JOIN shipment_details d ON d.shipment_id = s.shipment_id \
         WHERE s.shipment_id = ANY($1) ORDER BY s.shipment_id",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<DbId, ShipmentActivity> = BTreeMap::new();
    for row in rows {
        let entry = grouped
            .entry(row.shipment_id)
            .or_insert_with(|| ShipmentActivity {
                shipment_id: row.shipment_id,
                date: row.date,
                details: Vec::new(),
            });
        push_line(&mut entry.details, row.item_id, row.quantity, None);
    }
    Ok(grouped.into_values().map(ActivityRecord::Shipment).collect())
}

async fn fetch_giveaway_claims(pool: &PgPool, ids: &[DbId]) -> Result<Vec<ActivityRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, GiveawayClaimLineRow>(
        "SELECT c.giveaway_claim_id, c.user_id, g.name AS giveaway_name, c.date, \
                d.item_id, d.quantity \
         FROM giveaway_claims c \
         JOIN giveaways g ON g.giveaway_id = c.giveaway_id \
         LEFT JOIN giveaway_claim_details d ON d.giveaway_claim_id = c.giveaway_claim_id \
         WHERE c.giveaway_claim_id = ANY($1) ORDER BY c.giveaway_claim_id",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<DbId, GiveawayClaimActivity> = BTreeMap::new();
    for row in rows {
        let entry = grouped
            .entry(row.giveaway_claim_id)
            .or_insert_with(|| GiveawayClaimActivity {
                giveaway_claim_id: row.giveaway_claim_id,
                user_id: row.user_id,
                giveaway_name: row.giveaway_name.clone(),
                date: row.date,
                details: Vec::new(),
            });
        push_line(&mut entry.details, row.item_id, row.quantity, None);
    }
    Ok(grouped
        .into_values()
        .map(ActivityRecord::GiveawayClaim)
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BY_USER: ActivityFilter = ActivityFilter::ByUser {
        user_id: 1,
        include_anonymous_gift_senders: false,
    };
    const BY_ITEM: ActivityFilter = ActivityFilter::ByItem { item_id: 1 };

    #[test]
    fn global_union_covers_all_kinds() {
        let sql = union_sql(&ActivityFilter::Global);
        for kind in EntityKind::ALL {
            assert!(sql.contains(&format!("'{}'", kind.as_str())), "{kind:?} missing");
        }
        assert_eq!(sql.matches("UNION ALL").count(), 7);
    }

    #[test]
    fn user_union_excludes_shipments() {
        let sql = union_sql(&BY_USER);
        assert!(!sql.contains("'Shipment'"));
        assert_eq!(sql.matches("UNION ALL").count(), 6);
    }

    #[test]
    fn item_union_excludes_paypal_orders() {
        let sql = union_sql(&BY_ITEM);
        assert!(!sql.contains("'PaypalOrder'"));
        assert_eq!(sql.matches("UNION ALL").count(), 6);
    }

    #[test]
    fn anonymous_clause_toggles_with_flag() {
        let hidden = union_sql(&BY_USER);
        assert!(hidden.contains("anonymous = FALSE"));

        let shown = union_sql(&ActivityFilter::ByUser {
            user_id: 1,
            include_anonymous_gift_senders: true,
        });
        assert!(!shown.contains("anonymous = FALSE"));
    }

    #[test]
    fn reward_member_queries_recipient_table() {
        let sql = union_sql(&BY_USER);
        assert!(sql.contains("FROM reward_recipients WHERE recipient_id = $1"));
        // The rewards table itself is not consulted for user feeds.
        assert!(!sql.contains("FROM rewards "));
    }

    #[test]
    fn item_members_are_distinct() {
        let sql = union_sql(&BY_ITEM);
        // Every detail-join member deduplicates multi-line matches.
        assert_eq!(sql.matches("SELECT DISTINCT").count(), 6);
    }

    #[test]
    fn page_sql_orders_and_paginates() {
        let sql = page_sql(&BY_USER);
        assert!(sql.ends_with("ORDER BY activity_id DESC LIMIT $2 OFFSET $3"));

        let global = page_sql(&ActivityFilter::Global);
        assert!(global.ends_with("ORDER BY activity_id DESC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn count_sql_wraps_same_union() {
        let sql = count_sql(&BY_ITEM);
        assert!(sql.starts_with("SELECT COUNT(*) FROM ("));
        assert!(sql.contains(&union_sql(&BY_ITEM)));
    }

    #[test]
    fn filter_binds() {
        assert_eq!(filter_bind(&ActivityFilter::Global), None);
        assert_eq!(filter_bind(&BY_USER), Some(1));
        assert_eq!(filter_bind(&BY_ITEM), Some(1));
    }
}
