//! Request and response shapes exchanged with the remote hub.
//!
//! Field names on the wire follow the hub's JSON contract; the Rust names
//! describe what the fields hold.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::dispatch::DispatchResult;
use crate::constants::BEARER_SCHEME;

/// One product price change, as carried by a queue message and stored as a
/// record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPriceUpdate {
    pub sku: String,
    /// Reference ("from") price.
    #[serde(rename = "precoDe")]
    pub list_price: String,
    /// Selling ("for") price.
    #[serde(rename = "precoPor")]
    pub sale_price: String,
}

/// One stock level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub sku: String,
    #[serde(rename = "quantidade")]
    pub quantity: i64,
}

/// Bulk price update body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBatch {
    #[serde(rename = "precos")]
    pub prices: Vec<ProductPriceUpdate>,
}

/// Bulk stock update body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBatch {
    #[serde(rename = "estoques")]
    pub items: Vec<StockUpdate>,
}

/// A batch ready to be submitted, tagged by the hub operation it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HubBatch {
    Prices(PriceBatch),
    Stock(StockBatch),
}

impl HubBatch {
    /// Path of the bulk endpoint, relative to the hub base URL.
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Prices(_) => "/products/price-batch",
            Self::Stock(_) => "/products/stock-batch",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Prices(batch) => batch.prices.len(),
            Self::Stock(batch) => batch.items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Body returned by the hub's bulk endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HubResponse {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
}

impl HubResponse {
    /// Attach the HTTP status and normalize into a [`DispatchResult`].
    pub fn into_dispatch_result(self, status_code: u16) -> DispatchResult {
        if self.id >= 0 {
            return DispatchResult::success(self.id, status_code).with_details(self.details);
        }

        let error = self
            .error
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| "hub rejected the batch".to_string());
        DispatchResult { id: self.id, status_code, error, details: self.details }
    }
}

/// Bearer-scheme credential ready to be sent as an `Authorization` header.
///
/// An empty token means the hub issued nothing usable. It is distinct from
/// an unknown partition, which has no token at all.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token issued by the hub.
    pub fn from_raw(token: &str) -> Self {
        Self(format!("{BEARER_SCHEME} {token}"))
    }

    pub const fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Header value, e.g. `Bearer abc123`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("BearerToken(<empty>)")
        } else {
            f.write_str("BearerToken(<redacted>)")
        }
    }
}
