//! Partition token cache with moka
//!
//! Holds raw hub tokens keyed by `token_hub_<partition>`. Entries have no
//! intrinsic expiry: a token stays until the token manager deletes it after
//! a 401. An optional TTL bounds how long any token is trusted without
//! being re-issued.

use std::time::Duration;

use async_trait::async_trait;
use hubrelay_core::TokenCache;
use hubrelay_domain::{Result, TokenCacheConfig};
use moka::future::Cache;

/// Shared in-memory [`TokenCache`].
#[derive(Clone)]
pub struct MokaTokenCache {
    entries: Cache<String, String>,
}

impl MokaTokenCache {
    pub fn new(config: &TokenCacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_entries);
        if let Some(ttl) = config.ttl_secs {
            builder = builder.time_to_live(Duration::from_secs(ttl));
        }

        tracing::info!(
            max_entries = config.max_entries,
            ttl_seconds = config.ttl_secs,
            "Token cache configuration loaded"
        );

        Self { entries: builder.build() }
    }

    /// Approximate number of cached tokens.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl std::fmt::Debug for MokaTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaTokenCache").field("entries", &self.entries.entry_count()).finish()
    }
}

#[async_trait]
impl TokenCache for MokaTokenCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string()).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}
