use tradepost_core::error::CoreError;

use crate::store::StoreError;

/// Error type for feed queries.
///
/// Only `NotFound` for the filter's primary entity and activity-store
/// failures surface here; identity failures degrade inside the façade and
/// never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// A domain-level error, typically `NotFound` for the filter target.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The activity store itself failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for feed return values.
pub type FeedResult<T> = Result<T, FeedError>;
