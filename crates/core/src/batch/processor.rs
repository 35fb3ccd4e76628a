//! Timer-driven batch processor
//!
//! One processor exists per integration type. Each tick groups the pending
//! records by partition key, sends at most one bounded batch per partition
//! and writes the outcome back onto the records that were part of it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use hubrelay_domain::{IntegrationRecord, IntegrationStatus, IntegrationType, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::ports::{BatchDispatch, RecordStore};

/// Turns a stored payload back into the request type.
pub type PayloadDecoder<T> = fn(&str) -> serde_json::Result<T>;

/// Default [`PayloadDecoder`]: plain JSON.
pub fn decode_json<T: DeserializeOwned>(payload: &str) -> serde_json::Result<T> {
    serde_json::from_str(payload)
}

/// Summary of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Distinct partition keys among the pending records.
    pub partitions: usize,
    pub batches_dispatched: usize,
    pub records_done: usize,
    /// Dispatched records that stayed `PENDING` because the batch failed.
    pub records_pending: usize,
    /// Records left unexamined once a batch was full, kept for a later tick.
    pub records_deferred: usize,
    /// Records whose payload could not be decoded.
    pub payloads_skipped: usize,
}

impl TickReport {
    pub const fn is_idle(&self) -> bool {
        self.partitions == 0
    }
}

/// Generic processor for one integration type.
pub struct BatchProcessor<T> {
    integration_type: IntegrationType,
    batch_size: usize,
    store: Arc<dyn RecordStore>,
    dispatcher: Arc<dyn BatchDispatch<T>>,
    decode: PayloadDecoder<T>,
}

impl<T> BatchProcessor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Create a processor that decodes payloads as JSON.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn new(
        integration_type: IntegrationType,
        batch_size: usize,
        store: Arc<dyn RecordStore>,
        dispatcher: Arc<dyn BatchDispatch<T>>,
    ) -> Self {
        Self {
            integration_type,
            batch_size: batch_size.max(1),
            store,
            dispatcher,
            decode: decode_json::<T>,
        }
    }

    /// Replace the payload decoder
    #[must_use]
    pub fn with_decoder(mut self, decode: PayloadDecoder<T>) -> Self {
        self.decode = decode;
        self
    }

    pub const fn integration_type(&self) -> IntegrationType {
        self.integration_type
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run one tick.
    ///
    /// A store error aborts the tick; partitions already handled keep their
    /// writes.
    pub async fn on_tick(&self) -> Result<TickReport> {
        let records = self
            .store
            .find_by_status_and_type(IntegrationStatus::Pending, self.integration_type)
            .await?;

        let mut report = TickReport::default();
        if records.is_empty() {
            debug!(integration_type = %self.integration_type, "no pending records");
            return Ok(report);
        }

        let (order, mut groups) = group_by_partition(records);
        report.partitions = order.len();

        for partition_key in order {
            let group = groups.remove(&partition_key).unwrap_or_default();

            // Undecodable records do not count toward the batch bound.
            let mut items = Vec::with_capacity(self.batch_size.min(group.len()));
            let mut included = Vec::with_capacity(items.capacity());
            let mut remaining = group.into_iter();
            for record in remaining.by_ref() {
                match (self.decode)(&record.payload) {
                    Ok(item) => {
                        items.push(item);
                        included.push(record);
                    }
                    Err(err) => {
                        warn!(
                            integration_type = %self.integration_type,
                            partition_key = %partition_key,
                            record_id = record.id.as_deref().unwrap_or_default(),
                            error = %err,
                            "Skipping record with undecodable payload"
                        );
                        report.payloads_skipped += 1;
                    }
                }
                if items.len() == self.batch_size {
                    break;
                }
            }
            report.records_deferred += remaining.len();

            if items.is_empty() {
                debug!(partition_key = %partition_key, "nothing decodable for partition");
                continue;
            }

            let batch_len = items.len();
            let result = self.dispatcher.dispatch(items, &partition_key).await;
            report.batches_dispatched += 1;

            info!(
                integration_type = %self.integration_type,
                partition_key = %partition_key,
                records = batch_len,
                batch_id = result.id,
                status_code = result.status_code,
                "batch dispatched"
            );

            let now = Utc::now();
            for mut record in included {
                if !record.apply_dispatch_result(&result, now) {
                    continue;
                }
                let saved = self.store.save(record).await?;
                if saved.is_done() {
                    report.records_done += 1;
                } else {
                    report.records_pending += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Group records by partition key, keeping first-seen key order.
fn group_by_partition(
    records: Vec<IntegrationRecord>,
) -> (Vec<String>, HashMap<String, Vec<IntegrationRecord>>) {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<IntegrationRecord>> = HashMap::new();

    for record in records {
        let key = record.partition_key.clone();
        groups
            .entry(key)
            .or_insert_with_key(|key| {
                order.push(key.clone());
                Vec::new()
            })
            .push(record);
    }

    (order, groups)
}
