//! Hub service - per-operation dispatch under the resilient executor

use std::sync::Arc;

use async_trait::async_trait;
use hubrelay_common::resilience::{Clock, SystemClock};
use hubrelay_domain::{
    DispatchResult, HubBatch, PriceBatch, ProductPriceUpdate, StockBatch, StockUpdate,
};
use tracing::{debug, instrument};

use super::{HubClient, HubError};
use crate::auth::TokenManager;
use crate::batch::BatchDispatch;
use crate::resilience::ResilientExecutor;

/// Sends batches to the hub.
///
/// Token resolution runs inside the resilient operation, so a rejected or
/// empty token is retried together with the submit call.
pub struct HubService<C: Clock = SystemClock> {
    client: Arc<dyn HubClient>,
    tokens: TokenManager,
    executor: ResilientExecutor<C>,
}

impl<C: Clock> HubService<C> {
    pub fn new(
        client: Arc<dyn HubClient>,
        tokens: TokenManager,
        executor: ResilientExecutor<C>,
    ) -> Self {
        Self { client, tokens, executor }
    }

    pub const fn executor(&self) -> &ResilientExecutor<C> {
        &self.executor
    }

    /// `PUT /products/price-batch` for one partition.
    pub async fn update_product_price(
        &self,
        prices: Vec<ProductPriceUpdate>,
        partition_key: &str,
    ) -> DispatchResult {
        self.submit(HubBatch::Prices(PriceBatch { prices }), partition_key).await
    }

    /// `PUT /products/stock-batch` for one partition.
    pub async fn update_stock(
        &self,
        items: Vec<StockUpdate>,
        partition_key: &str,
    ) -> DispatchResult {
        self.submit(HubBatch::Stock(StockBatch { items }), partition_key).await
    }

    #[instrument(skip(self, batch), fields(endpoint = batch.endpoint(), items = batch.len()))]
    async fn submit(&self, batch: HubBatch, partition_key: &str) -> DispatchResult {
        let batch = &batch;
        self.executor
            .execute_generic_handling(move || async move {
                let token = self
                    .tokens
                    .resolve_token(partition_key)
                    .await?
                    .ok_or_else(|| HubError::UnknownPartition(partition_key.to_string()))?;
                if token.is_empty() {
                    return Err(HubError::EmptyToken);
                }

                debug!(partition_key, "submitting batch");
                self.client.submit_batch(&token, batch).await
            })
            .await
    }
}

#[async_trait]
impl<C: Clock> BatchDispatch<ProductPriceUpdate> for HubService<C> {
    async fn dispatch(
        &self,
        items: Vec<ProductPriceUpdate>,
        partition_key: &str,
    ) -> DispatchResult {
        self.update_product_price(items, partition_key).await
    }
}

#[async_trait]
impl<C: Clock> BatchDispatch<StockUpdate> for HubService<C> {
    async fn dispatch(&self, items: Vec<StockUpdate>, partition_key: &str) -> DispatchResult {
        self.update_stock(items, partition_key).await
    }
}
