use std::marker::PhantomData;
use std::sync::Arc;

use hubrelay_domain::{IntegrationRecord, IntegrationType, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::ports::QueueMessage;
use crate::batch::{decode_json, PayloadDecoder, RecordStore};

/// Persists inbound messages of one integration type as `PENDING` records.
///
/// The body is decoded into `T` and re-serialized, so stored payloads are
/// normalized. Malformed messages are dropped with a warning.
pub struct IntakeHandler<T> {
    integration_type: IntegrationType,
    store: Arc<dyn RecordStore>,
    decode: PayloadDecoder<T>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> IntakeHandler<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    pub fn new(integration_type: IntegrationType, store: Arc<dyn RecordStore>) -> Self {
        Self { integration_type, store, decode: decode_json::<T>, _payload: PhantomData }
    }

    #[must_use]
    pub fn with_decoder(mut self, decode: PayloadDecoder<T>) -> Self {
        self.decode = decode;
        self
    }

    pub const fn integration_type(&self) -> IntegrationType {
        self.integration_type
    }

    /// Handle one message.
    ///
    /// `Ok(None)` means the message was dropped; only store failures are
    /// errors.
    pub async fn on_message(&self, message: QueueMessage) -> Result<Option<IntegrationRecord>> {
        let Some(partition_key) = message.to.as_deref().map(str::trim).filter(|k| !k.is_empty())
        else {
            warn!(
                integration_type = %self.integration_type,
                "Dropping message without partition key"
            );
            return Ok(None);
        };

        let item = match (self.decode)(&message.body) {
            Ok(item) => item,
            Err(err) => {
                warn!(
                    integration_type = %self.integration_type,
                    partition_key,
                    error = %err,
                    "Dropping message with malformed body"
                );
                return Ok(None);
            }
        };

        let payload = match serde_json::to_string(&item) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(partition_key, error = %err, "Dropping message that cannot be re-serialized");
                return Ok(None);
            }
        };

        let record = match IntegrationRecord::pending(partition_key, self.integration_type, payload)
        {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    integration_type = %self.integration_type,
                    partition_key,
                    error = %err,
                    "Dropping invalid message"
                );
                return Ok(None);
            }
        };

        let saved = self.store.save(record).await?;
        debug!(
            integration_type = %self.integration_type,
            partition_key,
            record_id = saved.id.as_deref().unwrap_or_default(),
            "message stored as pending record"
        );
        Ok(Some(saved))
    }
}
