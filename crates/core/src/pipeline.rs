//! Per-type integration pipeline
//!
//! Bundles the batch processor and intake handler of one integration type
//! behind the object-safe [`Pipeline`] trait driven by the runtime.

use std::sync::Arc;

use async_trait::async_trait;
use hubrelay_domain::{IntegrationRecord, IntegrationType, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::batch::{BatchDispatch, BatchProcessor, RecordStore, TickReport};
use crate::intake::{IntakeHandler, QueueMessage};

/// Timer and queue entry points of one integration type.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn integration_type(&self) -> IntegrationType;

    /// Dispatch pending records.
    async fn on_tick(&self) -> Result<TickReport>;

    /// Store an inbound message; `Ok(None)` when it was dropped.
    async fn on_message(&self, message: QueueMessage) -> Result<Option<IntegrationRecord>>;
}

/// Processor plus intake for payload type `T`.
pub struct IntegrationPipeline<T> {
    processor: BatchProcessor<T>,
    intake: IntakeHandler<T>,
}

impl<T> IntegrationPipeline<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    /// Wire a JSON pipeline over a shared store and dispatcher.
    pub fn new(
        integration_type: IntegrationType,
        batch_size: usize,
        store: Arc<dyn RecordStore>,
        dispatcher: Arc<dyn BatchDispatch<T>>,
    ) -> Self {
        Self {
            processor: BatchProcessor::new(
                integration_type,
                batch_size,
                Arc::clone(&store),
                dispatcher,
            ),
            intake: IntakeHandler::new(integration_type, store),
        }
    }

    pub const fn from_parts(processor: BatchProcessor<T>, intake: IntakeHandler<T>) -> Self {
        Self { processor, intake }
    }

    pub const fn processor(&self) -> &BatchProcessor<T> {
        &self.processor
    }
}

#[async_trait]
impl<T> Pipeline for IntegrationPipeline<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    fn integration_type(&self) -> IntegrationType {
        self.processor.integration_type()
    }

    async fn on_tick(&self) -> Result<TickReport> {
        self.processor.on_tick().await
    }

    async fn on_message(&self, message: QueueMessage) -> Result<Option<IntegrationRecord>> {
        self.intake.on_message(message).await
    }
}
