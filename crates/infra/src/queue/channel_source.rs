//! mpsc-backed message source

use async_trait::async_trait;
use hubrelay_core::{MessageSource, QueueMessage};
use hubrelay_domain::{HubRelayError, Result};
use tokio::sync::{mpsc, Mutex};

/// Publishing half of an in-process queue.
#[derive(Debug, Clone)]
pub struct QueueSender {
    queue_name: String,
    tx: mpsc::Sender<QueueMessage>,
}

impl QueueSender {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Enqueue a message, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `HubRelayError::Internal` once the receiving side is gone.
    pub async fn publish(&self, message: QueueMessage) -> Result<()> {
        self.tx.send(message).await.map_err(|_| {
            HubRelayError::Internal(format!("queue '{}' is closed", self.queue_name))
        })
    }
}

/// Receiving half of an in-process queue.
///
/// The source closes once every [`QueueSender`] is dropped and the buffered
/// messages are drained.
#[derive(Debug)]
pub struct ChannelMessageSource {
    queue_name: String,
    rx: Mutex<mpsc::Receiver<QueueMessage>>,
}

impl ChannelMessageSource {
    /// Create a bounded queue named `queue_name`.
    pub fn channel(queue_name: impl Into<String>, capacity: usize) -> (QueueSender, Self) {
        let queue_name = queue_name.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            QueueSender { queue_name: queue_name.clone(), tx },
            Self { queue_name, rx: Mutex::new(rx) },
        )
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl MessageSource for ChannelMessageSource {
    async fn receive(&self) -> Option<QueueMessage> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_then_closes() {
        let (sender, source) = ChannelMessageSource::channel("stock", 4);

        sender.publish(QueueMessage::new("{}", "A")).await.unwrap();
        sender.publish(QueueMessage::new("[]", "B")).await.unwrap();
        drop(sender);

        assert_eq!(source.receive().await.unwrap().to.as_deref(), Some("A"));
        assert_eq!(source.receive().await.unwrap().body, "[]");
        assert!(source.receive().await.is_none());
    }

    #[tokio::test]
    async fn publishing_to_a_dropped_source_fails() {
        let (sender, source) = ChannelMessageSource::channel("price", 1);
        drop(source);

        let err = sender.publish(QueueMessage::new("{}", "A")).await.unwrap_err();

        assert!(err.to_string().contains("price"));
    }
}
