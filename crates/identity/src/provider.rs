//! External identity provider contract and HTTP implementation.
//!
//! The provider accepts at most [`PROVIDER_BATCH_LIMIT`] ids per call and
//! performs no retries; retry and fallback policy belong to the cache. A
//! timeout is supplied per call and a timed-out request is indistinguishable
//! from any other provider failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tradepost_core::identity::{IdentityProfile, PROVIDER_BATCH_LIMIT};
use tradepost_core::types::DbId;

/// Errors from a single provider call. All variants feed the same
/// degradation path in the cache.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure, including timeouts.
    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Identity provider returned status {0}")]
    Status(reqwest::StatusCode),

    /// The response body could not be decoded.
    #[error("Identity provider response could not be decoded: {0}")]
    Decode(String),

    /// More ids than the provider accepts in one call.
    #[error("Batch of {0} ids exceeds the provider limit of {PROVIDER_BATCH_LIMIT}")]
    BatchTooLarge(usize),
}

/// Batched lookup against the external identity API.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch profiles for up to [`PROVIDER_BATCH_LIMIT`] ids. Ids unknown to
    /// the provider are simply absent from the result.
    async fn fetch_batch(
        &self,
        ids: &[DbId],
        timeout: Duration,
    ) -> Result<Vec<IdentityProfile>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ProfilesResponse {
    profiles: Vec<IdentityProfile>,
}

/// HTTP client for the identity provider.
///
/// Issues `GET {base}/profiles?key=...&ids=a,b,c` and expects a JSON body of
/// the form `{"profiles": [...]}`.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn fetch_batch(
        &self,
        ids: &[DbId],
        timeout: Duration,
    ) -> Result<Vec<IdentityProfile>, ProviderError> {
        if ids.len() > PROVIDER_BATCH_LIMIT {
            return Err(ProviderError::BatchTooLarge(ids.len()));
        }

        let ids_param = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .http
            .get(format!("{}/profiles", self.base_url))
            .query(&[("key", self.api_key.as_str()), ("ids", ids_param.as_str())])
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }

        let body: ProfilesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(body.profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn oversized_batch_is_rejected_before_sending() {
        let provider = HttpIdentityProvider::new("http://localhost:0".into(), "key".into());
        let ids: Vec<DbId> = (0..(PROVIDER_BATCH_LIMIT as DbId + 1)).collect();

        let err = provider
            .fetch_batch(&ids, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_matches!(err, ProviderError::BatchTooLarge(101));
    }
}
