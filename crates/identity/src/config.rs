/// Identity provider and cache configuration loaded from environment
/// variables.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL of the identity provider API.
    pub api_url: String,
    /// API key sent with every provider request.
    pub api_key: String,
    /// Cache TTL in seconds (default: `3600`).
    pub cache_ttl_secs: i64,
    /// Per-request provider timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

impl IdentityConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Default    |
    /// |--------------------------|------------|
    /// | `IDENTITY_API_URL`       | (required) |
    /// | `IDENTITY_API_KEY`       | (required) |
    /// | `IDENTITY_CACHE_TTL_SECS`| `3600`     |
    /// | `IDENTITY_TIMEOUT_SECS`  | `30`       |
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_url = std::env::var("IDENTITY_API_URL").expect("IDENTITY_API_URL must be set");
        let api_key = std::env::var("IDENTITY_API_KEY").expect("IDENTITY_API_KEY must be set");

        let cache_ttl_secs: i64 = std::env::var("IDENTITY_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("IDENTITY_CACHE_TTL_SECS must be a valid i64");

        let request_timeout_secs: u64 = std::env::var("IDENTITY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("IDENTITY_TIMEOUT_SECS must be a valid u64");

        Self {
            api_url,
            api_key,
            cache_ttl_secs,
            request_timeout_secs,
        }
    }

    /// Cache TTL as a chrono duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs)
    }

    /// Provider request timeout as a std duration.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
