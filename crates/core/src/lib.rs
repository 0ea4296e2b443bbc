//! Tradepost domain core.
//!
//! Pure types and logic shared by the storage, identity, and feed crates:
//! the closed set of activity kinds, the feed filter sum type, detail-line
//! normalization, and identity-cache freshness math. Nothing in here touches
//! a database or the network.

pub mod activity;
pub mod error;
pub mod identity;
pub mod types;
