//! Integration records: the durable unit of work buffered between intake and
//! dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dispatch::DispatchResult;
use crate::constants::{MAX_ERROR_LENGTH, MAX_PARTITION_KEY_LENGTH, MAX_PAYLOAD_LENGTH};
use crate::{HubRelayError, Result};

/// Lifecycle status of an integration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationStatus {
    /// Not yet successfully dispatched.
    Pending,
    /// Dispatch succeeded; terminal.
    Done,
}

crate::impl_domain_status_conversions!(IntegrationStatus {
    Pending => "PENDING",
    Done => "DONE",
});

/// Downstream operation a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationType {
    UpdateStock,
    UpdateProductPrice,
    UpdateOrderStatus,
    UpdateRetailerCredit,
    SaveRecommendationList,
}

crate::impl_domain_status_conversions!(IntegrationType {
    UpdateStock => "UPDATE_STOCK",
    UpdateProductPrice => "UPDATE_PRODUCT_PRICE",
    UpdateOrderStatus => "UPDATE_ORDER_STATUS",
    UpdateRetailerCredit => "UPDATE_RETAILER_CREDIT",
    SaveRecommendationList => "SAVE_RECOMMENDATION_LIST",
});

impl IntegrationType {
    /// Every known integration type, in configuration order.
    pub const ALL: [Self; 5] = [
        Self::UpdateStock,
        Self::UpdateProductPrice,
        Self::UpdateOrderStatus,
        Self::UpdateRetailerCredit,
        Self::SaveRecommendationList,
    ];
}

/// One pending or completed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    /// Assigned by the record store on first save.
    pub id: Option<String>,
    pub partition_key: String,
    pub integration_type: IntegrationType,
    pub status: IntegrationStatus,
    pub payload: String,
    /// Outcome id of the last dispatch; negative means it failed.
    pub batch_id: i64,
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl IntegrationRecord {
    /// Build a new `PENDING` record, enforcing the partition key and payload
    /// length bounds.
    pub fn pending(
        partition_key: impl Into<String>,
        integration_type: IntegrationType,
        payload: impl Into<String>,
    ) -> Result<Self> {
        let partition_key = partition_key.into();
        let payload = payload.into();

        if partition_key.trim().is_empty() {
            return Err(HubRelayError::InvalidInput("partition key is empty".into()));
        }
        if partition_key.chars().count() > MAX_PARTITION_KEY_LENGTH {
            return Err(HubRelayError::InvalidInput(format!(
                "partition key exceeds {MAX_PARTITION_KEY_LENGTH} characters"
            )));
        }
        if payload.chars().count() > MAX_PAYLOAD_LENGTH {
            return Err(HubRelayError::InvalidInput(format!(
                "payload exceeds {MAX_PAYLOAD_LENGTH} characters"
            )));
        }

        Ok(Self {
            id: None,
            partition_key,
            integration_type,
            status: IntegrationStatus::Pending,
            payload,
            batch_id: 0,
            error: String::new(),
            created_at: Utc::now(),
            updated_at: None,
        })
    }

    pub fn is_done(&self) -> bool {
        self.status == IntegrationStatus::Done
    }

    /// Write a dispatch outcome onto the record.
    ///
    /// `DONE` is terminal: a completed record is left untouched and `false`
    /// is returned.
    pub fn apply_dispatch_result(&mut self, result: &DispatchResult, now: DateTime<Utc>) -> bool {
        if self.is_done() {
            return false;
        }

        self.batch_id = result.id;
        self.updated_at = Some(now);
        if result.is_success() {
            self.status = IntegrationStatus::Done;
            self.error.clear();
        } else {
            self.status = IntegrationStatus::Pending;
            self.error = truncate_chars(&result.error, MAX_ERROR_LENGTH);
        }
        true
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
