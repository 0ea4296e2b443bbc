//! Stale-tolerant cache in front of a rate-limited external identity
//! provider.
//!
//! The [`cache::IdentityCache`] service owns TTL invalidation, batched
//! refresh, and degradation to stale data when the provider is unavailable.
//! The provider and storage sides are trait contracts ([`provider::
//! IdentityProvider`], [`store::IdentityStore`]) with HTTP and Postgres
//! implementations here; tests run against in-memory fakes.

pub mod cache;
pub mod config;
pub mod provider;
pub mod store;

pub use cache::IdentityCache;
pub use config::IdentityConfig;
pub use provider::{HttpIdentityProvider, IdentityProvider, ProviderError};
pub use store::{IdentityStore, PgIdentityStore, StoreError};
