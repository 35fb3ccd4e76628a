//! Integration tests for partition token resolution

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use hubrelay_core::TokenManager;
use support::{credentials, FakeHubClient, InMemoryTokenCache};
use tokio_test::{assert_err, assert_ok};

const PARTITION: &str = "12345678000190";
const CACHE_KEY: &str = "token_hub_12345678000190";

fn manager(client: &Arc<FakeHubClient>, cache: &Arc<InMemoryTokenCache>) -> TokenManager {
    let partitions = BTreeMap::from([(PARTITION.to_string(), credentials())]);
    TokenManager::new(client.clone(), cache.clone(), partitions)
}

#[tokio::test]
async fn issues_and_caches_raw_token_when_cache_is_empty() {
    let client = Arc::new(FakeHubClient::new().issuing(Some("fresh")));
    let cache = Arc::new(InMemoryTokenCache::new());

    let token = assert_ok!(manager(&client, &cache).resolve_token(PARTITION).await);

    assert_eq!(token.expect("token issued").as_str(), "Bearer fresh");
    assert_eq!(cache.value(CACHE_KEY).as_deref(), Some("fresh"));
    assert_eq!(client.issue_calls(), 1);
    assert_eq!(client.validate_calls(), 0);
}

#[tokio::test]
async fn valid_cached_token_is_reused() {
    let client = Arc::new(FakeHubClient::new().accepting("cached"));
    let cache = Arc::new(InMemoryTokenCache::new().with_entry(CACHE_KEY, "cached"));

    let token = assert_ok!(manager(&client, &cache).resolve_token(PARTITION).await);

    assert_eq!(token.expect("cached token").as_str(), "Bearer cached");
    assert_eq!(client.validate_calls(), 1);
    assert_eq!(client.issue_calls(), 0);
}

/// Validates the refresh path.
///
/// # Test Steps
/// 1. Cache holds a token the hub rejects with 401
/// 2. The entry is deleted
/// 3. Exactly one issue call is made and the new token is cached
#[tokio::test]
async fn rejected_token_is_refreshed_exactly_once() {
    let client = Arc::new(FakeHubClient::new().issuing(Some("new")));
    let cache = Arc::new(InMemoryTokenCache::new().with_entry(CACHE_KEY, "stale"));

    let token = assert_ok!(manager(&client, &cache).resolve_token(PARTITION).await);

    assert_eq!(token.expect("refreshed token").as_str(), "Bearer new");
    assert_eq!(cache.deleted(), vec![CACHE_KEY.to_string()]);
    assert_eq!(cache.value(CACHE_KEY).as_deref(), Some("new"));
    assert_eq!(client.issue_calls(), 1);
}

#[tokio::test]
async fn unknown_partition_returns_none_without_issuing() {
    let client = Arc::new(FakeHubClient::new().issuing(Some("unused")));
    let cache = Arc::new(InMemoryTokenCache::new());

    let token = assert_ok!(manager(&client, &cache).resolve_token("99999999000199").await);

    assert!(token.is_none());
    assert_eq!(client.issue_calls(), 0);
}

#[tokio::test]
async fn empty_issued_token_is_not_cached() {
    for issued in [None, Some("")] {
        let client = Arc::new(FakeHubClient::new().issuing(issued));
        let cache = Arc::new(InMemoryTokenCache::new());

        let token = assert_ok!(manager(&client, &cache).resolve_token(PARTITION).await);

        assert!(token.expect("empty token").is_empty());
        assert_eq!(cache.value(CACHE_KEY), None);
    }
}

#[tokio::test]
async fn other_validation_errors_propagate() {
    struct Flaky;

    #[async_trait::async_trait]
    impl hubrelay_core::HubClient for Flaky {
        async fn submit_batch(
            &self,
            _: &hubrelay_domain::BearerToken,
            _: &hubrelay_domain::HubBatch,
        ) -> Result<hubrelay_domain::DispatchResult, hubrelay_core::HubError> {
            unreachable!()
        }

        async fn issue_token(
            &self,
            _: &hubrelay_domain::PartitionCredentials,
        ) -> Result<Option<String>, hubrelay_core::HubError> {
            unreachable!()
        }

        async fn validate_token(
            &self,
            _: &hubrelay_domain::BearerToken,
        ) -> Result<(), hubrelay_core::HubError> {
            Err(hubrelay_core::HubError::status(503, "maintenance"))
        }
    }

    let cache = Arc::new(InMemoryTokenCache::new().with_entry(CACHE_KEY, "cached"));
    let manager = TokenManager::new(
        Arc::new(Flaky),
        cache.clone(),
        BTreeMap::from([(PARTITION.to_string(), credentials())]),
    );

    let err = assert_err!(manager.resolve_token(PARTITION).await);

    assert_eq!(err, hubrelay_core::HubError::status(503, "maintenance"));
    assert!(cache.deleted().is_empty());
}
