//! Domain types and models

pub mod dispatch;
pub mod hub;
pub mod integration;

pub use dispatch::DispatchResult;
pub use hub::{
    BearerToken, HubBatch, HubResponse, PriceBatch, ProductPriceUpdate, StockBatch, StockUpdate,
};
pub use integration::{IntegrationRecord, IntegrationStatus, IntegrationType};
