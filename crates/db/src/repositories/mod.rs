pub mod activity_repo;
pub mod identity_cache_repo;

pub use activity_repo::ActivityRepo;
pub use identity_cache_repo::IdentityCacheRepo;
