//! Token manager with refresh on rejection
//!
//! Manages the hub token lifecycle per partition:
//! - Token lookup in the shared cache
//! - Validation of cached tokens against the hub
//! - Invalidation and a single re-issue when the hub answers 401
//! - Issuing from the partition's configured credentials

use std::collections::BTreeMap;
use std::sync::Arc;

use hubrelay_domain::constants::TOKEN_CACHE_KEY_PREFIX;
use hubrelay_domain::{BearerToken, HubRelayError, PartitionCredentials};
use tracing::{debug, info, warn};

use crate::hub::{HubClient, HubError, TokenCache};

/// Resolves bearer tokens for partitions.
///
/// Concurrent resolves for the same partition may both issue a token; the
/// last cache write wins.
pub struct TokenManager {
    client: Arc<dyn HubClient>,
    cache: Arc<dyn TokenCache>,
    partitions: BTreeMap<String, PartitionCredentials>,
}

impl TokenManager {
    pub fn new(
        client: Arc<dyn HubClient>,
        cache: Arc<dyn TokenCache>,
        partitions: BTreeMap<String, PartitionCredentials>,
    ) -> Self {
        Self { client, cache, partitions }
    }

    /// Cache key holding the raw token for `partition_key`.
    pub fn cache_key(partition_key: &str) -> String {
        format!("{TOKEN_CACHE_KEY_PREFIX}{partition_key}")
    }

    /// Resolve a usable token for `partition_key`.
    ///
    /// Returns `Ok(None)` when the partition has no configured credentials and
    /// `Some(BearerToken::empty())` when the hub issued an empty token.
    pub async fn resolve_token(
        &self,
        partition_key: &str,
    ) -> Result<Option<BearerToken>, HubError> {
        let key = Self::cache_key(partition_key);

        if let Some(cached) = self.cache.get(&key).await.map_err(cache_error)? {
            let token = BearerToken::from_raw(&cached);
            match self.client.validate_token(&token).await {
                Ok(()) => {
                    debug!(partition_key, "Using cached hub token");
                    return Ok(Some(token));
                }
                Err(err) if err.is_unauthorized() => {
                    info!(partition_key, "Cached hub token rejected, issuing a new one");
                    self.cache.delete(&key).await.map_err(cache_error)?;
                }
                Err(err) => return Err(err),
            }
        }

        self.issue(partition_key, &key).await
    }

    async fn issue(
        &self,
        partition_key: &str,
        key: &str,
    ) -> Result<Option<BearerToken>, HubError> {
        let Some(credentials) = self.partitions.get(partition_key) else {
            warn!(partition_key, "Hub credentials not found for partition");
            return Ok(None);
        };

        let Some(raw) = self.client.issue_token(credentials).await?.filter(|t| !t.is_empty())
        else {
            warn!(partition_key, "Hub issued an empty token");
            return Ok(Some(BearerToken::empty()));
        };

        self.cache.set(key, &raw).await.map_err(cache_error)?;
        info!(partition_key, "Hub token issued");
        Ok(Some(BearerToken::from_raw(&raw)))
    }
}

fn cache_error(err: HubRelayError) -> HubError {
    HubError::Cache(err.to_string())
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("partitions", &self.partitions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
