//! Port interfaces for batch processing operations

use async_trait::async_trait;
use hubrelay_domain::{
    DispatchResult, IntegrationRecord, IntegrationStatus, IntegrationType, Result,
};

/// Trait for durable storage of integration records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load every record with the given status and type, oldest first
    async fn find_by_status_and_type(
        &self,
        status: IntegrationStatus,
        integration_type: IntegrationType,
    ) -> Result<Vec<IntegrationRecord>>;

    /// Insert or update a record, assigning an id when it has none
    async fn save(&self, record: IntegrationRecord) -> Result<IntegrationRecord>;
}

/// Sends one partition's decoded payloads to the hub.
///
/// Implementations never fail: terminal errors are folded into a
/// [`DispatchResult`] with a negative id.
#[async_trait]
pub trait BatchDispatch<T>: Send + Sync {
    async fn dispatch(&self, items: Vec<T>, partition_key: &str) -> DispatchResult;
}
