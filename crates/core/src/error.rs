use crate::types::DbId;

/// Domain-level error type shared across the workspace.
///
/// Only `NotFound` for the primary queried entity is ever surfaced to a feed
/// caller; identity-provider failures degrade to cached data and never reach
/// this type.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A requested entity does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Input failed a domain validation rule.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl CoreError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound { entity, id }
    }
}
