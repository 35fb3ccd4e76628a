//! Port interfaces for queue intake

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message delivered by the queue transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// JSON body in the integration type's request shape.
    pub body: String,
    /// Routing field; carries the partition key.
    #[serde(default)]
    pub to: Option<String>,
}

impl QueueMessage {
    pub fn new(body: impl Into<String>, to: impl Into<String>) -> Self {
        Self { body: body.into(), to: Some(to.into()) }
    }
}

/// Trait for a queue the intake worker pulls from
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message; `None` once the source is closed.
    async fn receive(&self) -> Option<QueueMessage>;
}
