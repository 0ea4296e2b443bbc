//! Joined row shapes produced by the per-kind hydration queries.
//!
//! Each kind with detail lines is fetched as one parent×line join; rows are
//! grouped back into `ActivityRecord` payloads by the repository. Line
//! columns are nullable because of the LEFT JOIN (a parent with no lines
//! still produces one row).

use sqlx::FromRow;
use tradepost_core::types::{DbId, Timestamp};

/// `orders` joined with `order_details`.
#[derive(Debug, Clone, FromRow)]
pub struct OrderLineRow {
    pub order_id: DbId,
    pub user_id: DbId,
    pub date: Timestamp,
    pub item_id: Option<DbId>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
}

/// `liquidations` joined with `liquidation_details`.
#[derive(Debug, Clone, FromRow)]
pub struct LiquidationLineRow {
    pub liquidation_id: DbId,
    pub user_id: DbId,
    pub date: Timestamp,
    pub item_id: Option<DbId>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
}

/// A row from `paypal_orders`. No detail lines.
#[derive(Debug, Clone, FromRow)]
pub struct PaypalOrderRow {
    pub paypal_order_id: DbId,
    pub user_id: DbId,
    pub date: Timestamp,
    pub amount: f64,
    pub credit: f64,
}

/// `gifts` joined with `gift_details`.
#[derive(Debug, Clone, FromRow)]
pub struct GiftLineRow {
    pub gift_id: DbId,
    pub sender_id: DbId,
    pub recipient_id: DbId,
    pub anonymous: bool,
    pub message: Option<String>,
    pub date: Timestamp,
    pub item_id: Option<DbId>,
    pub quantity: Option<f64>,
}

/// `rewards` joined with `reward_details`. Recipients come from a second
/// batched query against `reward_recipients`.
#[derive(Debug, Clone, FromRow)]
pub struct RewardLineRow {
    pub reward_id: DbId,
    pub credit: f64,
    pub date: Timestamp,
    pub item_id: Option<DbId>,
    pub quantity: Option<f64>,
}

/// A row from `reward_recipients`.
#[derive(Debug, Clone, FromRow)]
pub struct RewardRecipientRow {
    pub reward_id: DbId,
    pub recipient_id: DbId,
}

/// `reviews` joined with its `ratings` association.
#[derive(Debug, Clone, FromRow)]
pub struct ReviewRow {
    pub review_id: DbId,
    pub rating_id: DbId,
    pub item_id: DbId,
    pub user_id: DbId,
    pub rating: i32,
    pub created: Timestamp,
    pub content: String,
}

/// `shipments` joined with `shipment_details`.
#[derive(Debug, Clone, FromRow)]
pub struct ShipmentLineRow {
    pub shipment_id: DbId,
    pub date: Timestamp,
    pub item_id: Option<DbId>,
    pub quantity: Option<f64>,
}

/// `giveaway_claims` joined with `giveaways` and `giveaway_claim_details`.
#[derive(Debug, Clone, FromRow)]
pub struct GiveawayClaimLineRow {
    pub giveaway_claim_id: DbId,
    pub user_id: DbId,
    pub giveaway_name: String,
    pub date: Timestamp,
    pub item_id: Option<DbId>,
    pub quantity: Option<f64>,
}
