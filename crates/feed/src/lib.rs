//! The activity feed: cross-kind aggregation plus identity decoration.
//!
//! [`aggregator::ActivityAggregator`] turns the store's union rows into
//! hydrated, normalized activities; [`facade::FeedService`] composes that
//! output with the identity cache to produce a decorated page in exactly one
//! cache round trip. Presentation-layer callers consume [`facade::FeedPage`].

pub mod aggregator;
pub mod error;
pub mod facade;
pub mod store;

pub use aggregator::ActivityAggregator;
pub use error::{FeedError, FeedResult};
pub use facade::{EnrichedActivity, FeedPage, FeedService};
pub use store::{ActivityStore, PgActivityStore, StoreError};
