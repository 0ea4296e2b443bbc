//! Activity feed domain types and normalization logic.
//!
//! The feed unifies eight transaction-like entity kinds into one stream
//! ordered by a shared id sequence. This module owns the closed kind set,
//! the filter sum type, and the pure normalization steps (detail squash,
//! derived totals, reward cash injection) applied after hydration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Reserved `item_id` denoting a cash/credit amount rather than a real item.
pub const CASH_ITEM_ID: DbId = 0;

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// Closed set of transaction types that can appear in the activity stream.
///
/// The string tags match the literal kind column projected by the SQL union,
/// so `as_str`/`from_str` must stay in lockstep with the store layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Order,
    Liquidation,
    PaypalOrder,
    Gift,
    Reward,
    Review,
    Shipment,
    GiveawayClaim,
}

impl EntityKind {
    /// Every kind, in union order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Order,
        EntityKind::Liquidation,
        EntityKind::PaypalOrder,
        EntityKind::Gift,
        EntityKind::Reward,
        EntityKind::Review,
        EntityKind::Shipment,
        EntityKind::GiveawayClaim,
    ];

    /// Stable tag used as the kind discriminator in union rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Order => "Order",
            Self::Liquidation => "Liquidation",
            Self::PaypalOrder => "PaypalOrder",
            Self::Gift => "Gift",
            Self::Reward => "Reward",
            Self::Review => "Review",
            Self::Shipment => "Shipment",
            Self::GiveawayClaim => "GiveawayClaim",
        }
    }

    /// Parse a kind tag as produced by [`as_str`](Self::as_str).
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "Order" => Ok(Self::Order),
            "Liquidation" => Ok(Self::Liquidation),
            "PaypalOrder" => Ok(Self::PaypalOrder),
            "Gift" => Ok(Self::Gift),
            "Reward" => Ok(Self::Reward),
            "Review" => Ok(Self::Review),
            "Shipment" => Ok(Self::Shipment),
            "GiveawayClaim" => Ok(Self::GiveawayClaim),
            _ => Err(CoreError::Validation(format!(
                "Unknown activity kind tag: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters & pagination
// ---------------------------------------------------------------------------

/// Restriction applied to the activity union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityFilter {
    /// No restriction; all kinds participate.
    Global,
    /// Activity visible on a user's profile.
    ByUser {
        user_id: DbId,
        /// Whether gifts the user sent anonymously are visible to them.
        /// Recipients always see their gifts regardless of this flag.
        include_anonymous_gift_senders: bool,
    },
    /// Activity that touched a specific item.
    ByItem { item_id: DbId },
}

impl ActivityFilter {
    /// Kinds that participate in the union for this filter.
    ///
    /// Shipments carry no user column, so they are absent from user feeds;
    /// PayPal orders carry no item lines, so they are absent from item feeds.
    pub fn kinds(&self) -> &'static [EntityKind] {
        match self {
            Self::Global => &EntityKind::ALL,
            Self::ByUser { .. } => &[
                EntityKind::Order,
                EntityKind::Liquidation,
                EntityKind::PaypalOrder,
                EntityKind::Gift,
                EntityKind::Reward,
                EntityKind::Review,
                EntityKind::GiveawayClaim,
            ],
            Self::ByItem { .. } => &[
                EntityKind::Order,
                EntityKind::Liquidation,
                EntityKind::Gift,
                EntityKind::Reward,
                EntityKind::Review,
                EntityKind::Shipment,
                EntityKind::GiveawayClaim,
            ],
        }
    }

    /// Reference semantics: whether a hydrated record matches this filter.
    ///
    /// The SQL union must agree with this function; in-memory test stores use
    /// it directly.
    pub fn matches(&self, record: &ActivityRecord) -> bool {
        if !self.kinds().contains(&record.kind()) {
            return false;
        }
        match *self {
            Self::Global => true,
            Self::ByUser {
                user_id,
                include_anonymous_gift_senders,
            } => match record {
                ActivityRecord::Order(o) => o.user_id == user_id,
                ActivityRecord::Liquidation(l) => l.user_id == user_id,
                ActivityRecord::PaypalOrder(p) => p.user_id == user_id,
                ActivityRecord::Gift(g) => {
                    g.recipient_id == user_id
                        || (g.sender_id == user_id
                            && (include_anonymous_gift_senders || !g.anonymous))
                }
                ActivityRecord::Reward(r) => r.recipient_ids.contains(&user_id),
                ActivityRecord::Review(r) => r.user_id == user_id,
                ActivityRecord::Shipment(_) => false,
                ActivityRecord::GiveawayClaim(c) => c.user_id == user_id,
            },
            Self::ByItem { item_id } => match record {
                ActivityRecord::Order(o) => has_item(&o.details, item_id),
                ActivityRecord::Liquidation(l) => has_item(&l.details, item_id),
                ActivityRecord::PaypalOrder(_) => false,
                ActivityRecord::Gift(g) => has_item(&g.details, item_id),
                ActivityRecord::Reward(r) => has_item(&r.details, item_id),
                ActivityRecord::Review(r) => r.item_id == item_id,
                ActivityRecord::Shipment(s) => has_item(&s.details, item_id),
                ActivityRecord::GiveawayClaim(c) => has_item(&c.details, item_id),
            },
        }
    }
}

fn has_item(details: &[DetailLine], item_id: DbId) -> bool {
    details.iter().any(|d| d.item_id == item_id)
}

/// Offset/limit pagination window.
///
/// Offset pagination is safe here because the union is totally ordered by the
/// shared id sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }
}

// ---------------------------------------------------------------------------
// Union rows & detail lines
// ---------------------------------------------------------------------------

/// One row of the activity union: a global id plus its kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityRef {
    pub activity_id: DbId,
    pub kind: EntityKind,
}

/// An item/quantity (or cash) component of an activity, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailLine {
    pub item_id: DbId,
    /// May be fractional for currency lines.
    pub quantity: f64,
    pub unit_price: Option<f64>,
}

impl DetailLine {
    pub fn new(item_id: DbId, quantity: f64) -> Self {
        Self {
            item_id,
            quantity,
            unit_price: None,
        }
    }

    pub fn priced(item_id: DbId, quantity: f64, unit_price: f64) -> Self {
        Self {
            item_id,
            quantity,
            unit_price: Some(unit_price),
        }
    }
}

/// Normalized `item_id -> quantity` mapping for an activity.
pub type DetailMap = BTreeMap<DbId, f64>;

/// Squash detail lines into the `item_id -> quantity` map, summing duplicate
/// item lines. Idempotent: squashing a squashed map's lines is a no-op.
pub fn squash_details(lines: &[DetailLine]) -> DetailMap {
    let mut map = DetailMap::new();
    for line in lines {
        *map.entry(line.item_id).or_insert(0.0) += line.quantity;
    }
    map
}

/// Sum of `unit_price * quantity` across lines; lines without a price
/// contribute nothing.
pub fn line_total(lines: &[DetailLine]) -> f64 {
    lines
        .iter()
        .filter_map(|d| d.unit_price.map(|p| p * d.quantity))
        .sum()
}

// ---------------------------------------------------------------------------
// Hydrated records
// ---------------------------------------------------------------------------

/// Full per-kind payload fetched during hydration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ActivityRecord {
    Order(OrderActivity),
    Liquidation(LiquidationActivity),
    PaypalOrder(PaypalOrderActivity),
    Gift(GiftActivity),
    Reward(RewardActivity),
    Review(ReviewActivity),
    Shipment(ShipmentActivity),
    GiveawayClaim(GiveawayClaimActivity),
}

/// A store purchase paid with on-site credit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderActivity {
    pub order_id: DbId,
    pub user_id: DbId,
    pub date: Timestamp,
    // Raw lines never serialize; the squashed map on the normalized wrapper
    // is the wire representation.
    #[serde(skip_serializing)]
    pub details: Vec<DetailLine>,
}

/// Items sold back to the store for credit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidationActivity {
    pub liquidation_id: DbId,
    pub user_id: DbId,
    pub date: Timestamp,
    #[serde(skip_serializing)]
    pub details: Vec<DetailLine>,
}

/// A real-money credit purchase. Carries no item lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaypalOrderActivity {
    pub paypal_order_id: DbId,
    pub user_id: DbId,
    pub date: Timestamp,
    /// Real currency amount paid.
    pub amount: f64,
    /// Site credit granted.
    pub credit: f64,
}

/// Items or credit sent from one user to another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GiftActivity {
    pub gift_id: DbId,
    pub sender_id: DbId,
    pub recipient_id: DbId,
    pub anonymous: bool,
    pub message: Option<String>,
    pub date: Timestamp,
    #[serde(skip_serializing)]
    pub details: Vec<DetailLine>,
}

/// An admin-issued reward, possibly to multiple recipients, possibly
/// carrying a cash component alongside item lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardActivity {
    pub reward_id: DbId,
    pub credit: f64,
    pub date: Timestamp,
    pub recipient_ids: Vec<DbId>,
    #[serde(skip_serializing)]
    pub details: Vec<DetailLine>,
}

/// A written review attached to an item rating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewActivity {
    pub review_id: DbId,
    pub rating_id: DbId,
    pub item_id: DbId,
    pub user_id: DbId,
    pub rating: i32,
    pub created: Timestamp,
    pub content: String,
}

/// A bulk stock shipment into the store. Not tied to a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentActivity {
    pub shipment_id: DbId,
    pub date: Timestamp,
    #[serde(skip_serializing)]
    pub details: Vec<DetailLine>,
}

/// Items claimed from a giveaway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GiveawayClaimActivity {
    pub giveaway_claim_id: DbId,
    pub user_id: DbId,
    pub giveaway_name: String,
    pub date: Timestamp,
    #[serde(skip_serializing)]
    pub details: Vec<DetailLine>,
}

impl ActivityRecord {
    /// The global activity id, shared with the union row.
    pub fn activity_id(&self) -> DbId {
        match self {
            Self::Order(o) => o.order_id,
            Self::Liquidation(l) => l.liquidation_id,
            Self::PaypalOrder(p) => p.paypal_order_id,
            Self::Gift(g) => g.gift_id,
            Self::Reward(r) => r.reward_id,
            Self::Review(r) => r.review_id,
            Self::Shipment(s) => s.shipment_id,
            Self::GiveawayClaim(c) => c.giveaway_claim_id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Order(_) => EntityKind::Order,
            Self::Liquidation(_) => EntityKind::Liquidation,
            Self::PaypalOrder(_) => EntityKind::PaypalOrder,
            Self::Gift(_) => EntityKind::Gift,
            Self::Reward(_) => EntityKind::Reward,
            Self::Review(_) => EntityKind::Review,
            Self::Shipment(_) => EntityKind::Shipment,
            Self::GiveawayClaim(_) => EntityKind::GiveawayClaim,
        }
    }

    /// Display timestamp. Source field names differ per kind but every kind
    /// resolves to one; used for final display ordering only, never for
    /// pagination.
    pub fn occurred_at(&self) -> Timestamp {
        match self {
            Self::Order(o) => o.date,
            Self::Liquidation(l) => l.date,
            Self::PaypalOrder(p) => p.date,
            Self::Gift(g) => g.date,
            Self::Reward(r) => r.date,
            Self::Review(r) => r.created,
            Self::Shipment(s) => s.date,
            Self::GiveawayClaim(c) => c.date,
        }
    }

    /// Distinct user ids referenced by this record (senders, recipients,
    /// owners), used by the façade to batch identity lookups.
    pub fn actor_ids(&self) -> Vec<DbId> {
        match self {
            Self::Order(o) => vec![o.user_id],
            Self::Liquidation(l) => vec![l.user_id],
            Self::PaypalOrder(p) => vec![p.user_id],
            Self::Gift(g) => {
                if g.sender_id == g.recipient_id {
                    vec![g.sender_id]
                } else {
                    vec![g.sender_id, g.recipient_id]
                }
            }
            Self::Reward(r) => r.recipient_ids.clone(),
            Self::Review(r) => vec![r.user_id],
            Self::Shipment(_) => vec![],
            Self::GiveawayClaim(c) => vec![c.user_id],
        }
    }

    fn detail_lines(&self) -> &[DetailLine] {
        match self {
            Self::Order(o) => &o.details,
            Self::Liquidation(l) => &l.details,
            Self::Gift(g) => &g.details,
            Self::Reward(r) => &r.details,
            Self::Shipment(s) => &s.details,
            Self::GiveawayClaim(c) => &c.details,
            Self::PaypalOrder(_) | Self::Review(_) => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// A hydrated record plus its normalized detail map and derived amount,
/// ready for decoration by the feed façade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedActivity {
    pub activity_id: DbId,
    #[serde(skip)]
    pub kind: EntityKind,
    pub occurred_at: Timestamp,
    /// Squashed `item_id -> quantity` mapping; empty for kinds without lines.
    pub details: DetailMap,
    /// Derived monetary figure where applicable: order sub-total, liquidation
    /// total, paypal amount, or reward credit.
    pub amount: Option<f64>,
    #[serde(flatten)]
    pub record: ActivityRecord,
}

/// Normalize one hydrated record: squash duplicate detail lines, compute the
/// derived total, and inject the synthetic reward cash line.
pub fn normalize(record: ActivityRecord) -> NormalizedActivity {
    let mut details = squash_details(record.detail_lines());

    let amount = match &record {
        ActivityRecord::Order(o) => Some(line_total(&o.details)),
        ActivityRecord::Liquidation(l) => Some(line_total(&l.details)),
        ActivityRecord::PaypalOrder(p) => Some(p.amount),
        ActivityRecord::Reward(r) => {
            // Cash component rides along as item 0.
            if r.credit > 0.0 {
                details.insert(CASH_ITEM_ID, r.credit);
            }
            Some(r.credit)
        }
        _ => None,
    };

    NormalizedActivity {
        activity_id: record.activity_id(),
        kind: record.kind(),
        occurred_at: record.occurred_at(),
        details,
        amount,
        record,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn gift(sender: DbId, recipient: DbId, anonymous: bool) -> ActivityRecord {
        ActivityRecord::Gift(GiftActivity {
            gift_id: 10,
            sender_id: sender,
            recipient_id: recipient,
            anonymous,
            message: None,
            date: ts(0),
            details: vec![DetailLine::new(3, 1.0)],
        })
    }

    // -- kind tags --

    #[test]
    fn kind_tags_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_tag_rejected() {
        assert!(EntityKind::from_str("Refund").is_err());
    }

    // -- squash --

    #[test]
    fn squash_sums_duplicate_items() {
        let lines = vec![
            DetailLine::new(5, 2.0),
            DetailLine::new(7, 1.0),
            DetailLine::new(5, 3.0),
        ];
        let map = squash_details(&lines);
        assert_eq!(map.get(&5), Some(&5.0));
        assert_eq!(map.get(&7), Some(&1.0));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn squash_is_idempotent() {
        let lines = vec![
            DetailLine::new(5, 2.0),
            DetailLine::new(5, 3.0),
            DetailLine::new(9, 0.5),
        ];
        let once = squash_details(&lines);
        let relines: Vec<DetailLine> = once
            .iter()
            .map(|(&item, &qty)| DetailLine::new(item, qty))
            .collect();
        assert_eq!(squash_details(&relines), once);
    }

    #[test]
    fn line_total_ignores_unpriced_lines() {
        let lines = vec![
            DetailLine::priced(1, 2.0, 10.0),
            DetailLine::new(2, 4.0),
            DetailLine::priced(3, 1.0, 2.5),
        ];
        assert!((line_total(&lines) - 22.5).abs() < f64::EPSILON);
    }

    // -- normalize --

    #[test]
    fn order_subtotal_derived_from_lines() {
        let normalized = normalize(ActivityRecord::Order(OrderActivity {
            order_id: 1,
            user_id: 2,
            date: ts(0),
            details: vec![
                DetailLine::priced(5, 2.0, 100.0),
                DetailLine::priced(6, 1.0, 50.0),
            ],
        }));
        assert_eq!(normalized.amount, Some(250.0));
        assert_eq!(normalized.details.get(&5), Some(&2.0));
    }

    #[test]
    fn reward_cash_injected_as_item_zero() {
        let normalized = normalize(ActivityRecord::Reward(RewardActivity {
            reward_id: 1,
            credit: 500.0,
            date: ts(0),
            recipient_ids: vec![2],
            details: vec![],
        }));
        assert_eq!(normalized.details.len(), 1);
        assert_eq!(normalized.details.get(&CASH_ITEM_ID), Some(&500.0));
    }

    #[test]
    fn reward_without_credit_gets_no_cash_line() {
        let normalized = normalize(ActivityRecord::Reward(RewardActivity {
            reward_id: 1,
            credit: 0.0,
            date: ts(0),
            recipient_ids: vec![2],
            details: vec![DetailLine::new(4, 2.0)],
        }));
        assert!(!normalized.details.contains_key(&CASH_ITEM_ID));
        assert_eq!(normalized.details.get(&4), Some(&2.0));
    }

    #[test]
    fn reward_cash_line_coexists_with_items() {
        let normalized = normalize(ActivityRecord::Reward(RewardActivity {
            reward_id: 1,
            credit: 250.0,
            date: ts(0),
            recipient_ids: vec![2, 3],
            details: vec![DetailLine::new(4, 1.0)],
        }));
        assert_eq!(normalized.details.get(&CASH_ITEM_ID), Some(&250.0));
        assert_eq!(normalized.details.get(&4), Some(&1.0));
    }

    // -- gift visibility --

    #[test]
    fn anonymous_gift_hidden_from_sender_by_default() {
        let filter = ActivityFilter::ByUser {
            user_id: 1,
            include_anonymous_gift_senders: false,
        };
        assert!(!filter.matches(&gift(1, 2, true)));
    }

    #[test]
    fn anonymous_gift_visible_to_sender_when_allowed() {
        let filter = ActivityFilter::ByUser {
            user_id: 1,
            include_anonymous_gift_senders: true,
        };
        assert!(filter.matches(&gift(1, 2, true)));
    }

    #[test]
    fn anonymous_gift_always_visible_to_recipient() {
        for include in [false, true] {
            let filter = ActivityFilter::ByUser {
                user_id: 2,
                include_anonymous_gift_senders: include,
            };
            assert!(filter.matches(&gift(1, 2, true)));
        }
    }

    #[test]
    fn non_anonymous_gift_visible_to_sender() {
        let filter = ActivityFilter::ByUser {
            user_id: 1,
            include_anonymous_gift_senders: false,
        };
        assert!(filter.matches(&gift(1, 2, false)));
    }

    // -- filter kind participation --

    #[test]
    fn shipments_excluded_from_user_feeds() {
        let filter = ActivityFilter::ByUser {
            user_id: 1,
            include_anonymous_gift_senders: true,
        };
        assert!(!filter.kinds().contains(&EntityKind::Shipment));
    }

    #[test]
    fn paypal_orders_excluded_from_item_feeds() {
        let filter = ActivityFilter::ByItem { item_id: 1 };
        assert!(!filter.kinds().contains(&EntityKind::PaypalOrder));
        let record = ActivityRecord::PaypalOrder(PaypalOrderActivity {
            paypal_order_id: 1,
            user_id: 2,
            date: ts(0),
            amount: 10.0,
            credit: 1000.0,
        });
        assert!(!filter.matches(&record));
    }

    #[test]
    fn by_item_matches_detail_lines() {
        let filter = ActivityFilter::ByItem { item_id: 3 };
        assert!(filter.matches(&gift(1, 2, false)));
        let other = ActivityFilter::ByItem { item_id: 4 };
        assert!(!other.matches(&gift(1, 2, false)));
    }

    #[test]
    fn reward_matched_via_recipient_list() {
        let record = ActivityRecord::Reward(RewardActivity {
            reward_id: 1,
            credit: 0.0,
            date: ts(0),
            recipient_ids: vec![7, 8],
            details: vec![],
        });
        let hit = ActivityFilter::ByUser {
            user_id: 8,
            include_anonymous_gift_senders: false,
        };
        let miss = ActivityFilter::ByUser {
            user_id: 9,
            include_anonymous_gift_senders: false,
        };
        assert!(hit.matches(&record));
        assert!(!miss.matches(&record));
    }

    // -- wire shape --

    #[test]
    fn normalized_activity_serializes_flat_with_kind_tag() {
        let normalized = normalize(ActivityRecord::Order(OrderActivity {
            order_id: 7,
            user_id: 2,
            date: ts(0),
            details: vec![DetailLine::priced(5, 2.0, 10.0)],
        }));
        let json = serde_json::to_value(&normalized).unwrap();

        assert_eq!(json["kind"], "Order");
        assert_eq!(json["activity_id"], 7);
        assert_eq!(json["order_id"], 7);
        assert_eq!(json["amount"], 20.0);
        assert_eq!(json["details"]["5"], 2.0);
    }

    // -- actor collection --

    #[test]
    fn gift_actors_deduplicate_self_gift() {
        let record = gift(2, 2, false);
        assert_eq!(record.actor_ids(), vec![2]);
    }

    #[test]
    fn shipment_has_no_actors() {
        let record = ActivityRecord::Shipment(ShipmentActivity {
            shipment_id: 1,
            date: ts(0),
            details: vec![],
        });
        assert!(record.actor_ids().is_empty());
    }
}
