//! Integration tests for hub dispatch under the resilient executor

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use hubrelay_core::{BatchDispatch, HubError, HubService, ResilientExecutor, TokenManager};
use hubrelay_domain::{DispatchResult, HubBatch, ProductPriceUpdate, StockUpdate};
use support::{credentials, fast_resilience, FakeHubClient, InMemoryTokenCache};

const PARTITION: &str = "12345678000190";

fn service(client: &Arc<FakeHubClient>, max_attempts: u32) -> HubService {
    let cache = Arc::new(InMemoryTokenCache::new());
    let tokens = TokenManager::new(
        client.clone(),
        cache,
        BTreeMap::from([(PARTITION.to_string(), credentials())]),
    );
    let executor =
        ResilientExecutor::from_settings(&fast_resilience(max_attempts)).expect("valid settings");
    HubService::new(client.clone(), tokens, executor)
}

fn price(sku: &str) -> ProductPriceUpdate {
    ProductPriceUpdate { sku: sku.into(), list_price: "19.90".into(), sale_price: "14.90".into() }
}

#[tokio::test]
async fn submits_price_batch_with_bearer_token() {
    let client = Arc::new(
        FakeHubClient::new()
            .issuing(Some("abc"))
            .responding(Ok(DispatchResult::success(42, 200))),
    );

    let result =
        service(&client, 3).update_product_price(vec![price("1"), price("2")], PARTITION).await;

    assert_eq!(result.id, 42);
    let submitted = client.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].0, "Bearer abc");
    match &submitted[0].1 {
        HubBatch::Prices(batch) => assert_eq!(batch.prices.len(), 2),
        other => panic!("unexpected batch: {other:?}"),
    }
}

#[tokio::test]
async fn stock_dispatch_targets_stock_endpoint() {
    let client = Arc::new(FakeHubClient::new().issuing(Some("abc")));
    let service = service(&client, 3);

    let items = vec![StockUpdate { sku: "sku".into(), quantity: 3 }];
    let result = BatchDispatch::<StockUpdate>::dispatch(&service, items, PARTITION).await;

    assert!(result.is_success());
    assert_eq!(client.submitted()[0].1.endpoint(), "/products/stock-batch");
}

/// A 401 on submit is retried; the next attempt finds the cached token
/// rejected, refreshes it and succeeds.
#[tokio::test]
async fn unauthorized_submit_refreshes_token_on_retry() {
    let client = Arc::new(
        FakeHubClient::new()
            .issuing(Some("first"))
            .issuing(Some("second"))
            .responding(Err(HubError::status(401, "token expired")))
            .responding(Ok(DispatchResult::success(7, 200))),
    );

    let result = service(&client, 3).update_product_price(vec![price("1")], PARTITION).await;

    assert_eq!(result.id, 7);
    assert_eq!(client.issue_calls(), 2);
    let headers: Vec<String> = client.submitted().into_iter().map(|(token, _)| token).collect();
    assert_eq!(headers, vec!["Bearer first", "Bearer second"]);
}

#[tokio::test]
async fn client_error_is_terminal() {
    let client = Arc::new(
        FakeHubClient::new()
            .issuing(Some("abc"))
            .responding(Err(HubError::status(400, "invalid sku"))),
    );

    let result = service(&client, 3).update_product_price(vec![price("1")], PARTITION).await;

    assert_eq!(result.id, -1);
    assert_eq!(result.status_code, 400);
    assert!(result.error.contains("invalid sku"));
    assert_eq!(client.submitted().len(), 1);
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let client = Arc::new(
        FakeHubClient::new()
            .accepting("abc")
            .issuing(Some("abc"))
            .responding(Err(HubError::status(503, "unavailable")))
            .responding(Err(HubError::status(503, "unavailable")))
            .responding(Err(HubError::status(503, "unavailable"))),
    );

    let result = service(&client, 3).update_product_price(vec![price("1")], PARTITION).await;

    assert_eq!(result.id, -1);
    assert_eq!(result.status_code, 503);
    assert_eq!(client.submitted().len(), 3);
    assert_eq!(client.issue_calls(), 1);
}

#[tokio::test]
async fn unknown_partition_fails_without_submitting() {
    let client = Arc::new(FakeHubClient::new());

    let result =
        service(&client, 3).update_product_price(vec![price("1")], "00000000000000").await;

    assert_eq!(result.id, -1);
    assert_eq!(result.status_code, 500);
    assert!(client.submitted().is_empty());
    assert_eq!(client.issue_calls(), 0);
}

#[tokio::test]
async fn empty_token_is_retried_as_unauthorized() {
    let client = Arc::new(FakeHubClient::new());

    let result = service(&client, 2).update_product_price(vec![price("1")], PARTITION).await;

    assert_eq!(result.id, -1);
    assert_eq!(result.status_code, 401);
    assert_eq!(client.issue_calls(), 2);
    assert!(client.submitted().is_empty());
}
