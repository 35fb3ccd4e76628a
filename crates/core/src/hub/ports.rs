//! Port interfaces for hub operations

use async_trait::async_trait;
use hubrelay_domain::{BearerToken, DispatchResult, HubBatch, PartitionCredentials, Result};

use super::HubError;

/// Trait for the HTTP hub
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Submit a batch to its bulk endpoint.
    ///
    /// A 2xx response is always `Ok`, even when the hub reports a negative id.
    async fn submit_batch(
        &self,
        token: &BearerToken,
        batch: &HubBatch,
    ) -> std::result::Result<DispatchResult, HubError>;

    /// Exchange partition credentials for a raw token.
    ///
    /// `Ok(None)` when the hub answered without a token.
    async fn issue_token(
        &self,
        credentials: &PartitionCredentials,
    ) -> std::result::Result<Option<String>, HubError>;

    /// Check a token; a rejected token surfaces as HTTP 401.
    async fn validate_token(&self, token: &BearerToken) -> std::result::Result<(), HubError>;
}

/// Trait for the shared token cache
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
