//! Bounded-concurrency queue consumer for one integration pipeline.
//!
//! The worker takes a permit before receiving, so at most
//! `max_concurrent_messages` messages are being handled at once. It stops
//! when cancelled or when the source closes, and waits for in-flight
//! handlers before finishing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hubrelay_core::{MessageSource, Pipeline, QueueMessage};
use hubrelay_domain::QueueConfig;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::{SchedulerError, SchedulerResult};

/// Configuration for an intake worker.
#[derive(Debug, Clone)]
pub struct IntakeWorkerConfig {
    /// In-flight message bound; the prefetch analogue.
    pub max_concurrent_messages: usize,
    /// Timeout for awaiting the worker task on stop.
    pub join_timeout: Duration,
}

impl Default for IntakeWorkerConfig {
    fn default() -> Self {
        Self { max_concurrent_messages: 8, join_timeout: Duration::from_secs(10) }
    }
}

impl IntakeWorkerConfig {
    pub fn from_queue_config(config: &QueueConfig) -> Self {
        Self { max_concurrent_messages: config.max_concurrent_messages, ..Self::default() }
    }
}

/// Running totals of handled messages.
#[derive(Debug, Default)]
pub struct IntakeStats {
    received: AtomicU64,
    stored: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl IntakeStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Messages persisted as pending records.
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    /// Malformed messages discarded by the pipeline.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages whose record could not be saved.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Queue consumer with explicit lifecycle management.
pub struct IntakeWorker {
    pipeline: Arc<dyn Pipeline>,
    source: Arc<dyn MessageSource>,
    config: IntakeWorkerConfig,
    cancellation_token: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    stats: Arc<IntakeStats>,
}

impl IntakeWorker {
    /// Create a stopped worker.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] when the concurrency bound is
    /// zero.
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        source: Arc<dyn MessageSource>,
        config: IntakeWorkerConfig,
    ) -> SchedulerResult<Self> {
        if config.max_concurrent_messages == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrent_messages must be greater than 0".into(),
            ));
        }

        Ok(Self {
            pipeline,
            source,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: None,
            stats: Arc::new(IntakeStats::default()),
        })
    }

    /// Spawn the receive loop.
    ///
    /// # Errors
    ///
    /// Returns error if the worker is already running
    #[instrument(skip(self), fields(integration_type = %self.pipeline.integration_type()))]
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation_token = CancellationToken::new();

        let pipeline = Arc::clone(&self.pipeline);
        let source = Arc::clone(&self.source);
        let max_concurrent = self.config.max_concurrent_messages;
        let cancel = self.cancellation_token.clone();
        let stats = Arc::clone(&self.stats);

        self.task_handle = Some(tokio::spawn(async move {
            Self::receive_loop(pipeline, source, max_concurrent, cancel, stats).await;
        }));

        info!(
            worker = "intake",
            event = "start",
            max_concurrent,
            "Intake worker started"
        );
        Ok(())
    }

    /// Cancel the loop and wait for in-flight messages.
    ///
    /// # Errors
    ///
    /// Returns error if the worker is not running or does not finish within
    /// the join timeout
    #[instrument(skip(self), fields(integration_type = %self.pipeline.integration_type()))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation_token.cancel();

        let join_timeout = self.config.join_timeout;
        tokio::time::timeout(join_timeout, handle)
            .await
            .map_err(|_| SchedulerError::Timeout { duration: join_timeout })??;

        info!(worker = "intake", event = "stop", "Intake worker stopped");
        Ok(())
    }

    /// Wait until the loop ends by itself, i.e. the source closed.
    ///
    /// # Errors
    ///
    /// Returns error if the worker is not running or its task panicked
    pub async fn join(&mut self) -> SchedulerResult<()> {
        let handle = self.task_handle.take().ok_or(SchedulerError::NotRunning)?;
        handle.await?;
        Ok(())
    }

    /// True while the loop task is alive.
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> &IntakeStats {
        &self.stats
    }

    async fn receive_loop(
        pipeline: Arc<dyn Pipeline>,
        source: Arc<dyn MessageSource>,
        max_concurrent: usize,
        cancel: CancellationToken,
        stats: Arc<IntakeStats>,
    ) {
        let integration_type = pipeline.integration_type();
        let permits = Arc::new(Semaphore::new(max_concurrent));
        let mut in_flight = JoinSet::new();

        loop {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = source.receive() => message,
            };

            let Some(message) = message else {
                info!(
                    worker = "intake",
                    event = "source_closed",
                    %integration_type,
                    "Message source closed"
                );
                break;
            };

            stats.received.fetch_add(1, Ordering::Relaxed);
            let pipeline = Arc::clone(&pipeline);
            let stats = Arc::clone(&stats);
            in_flight.spawn(async move {
                Self::handle_message(pipeline.as_ref(), message, &stats).await;
                drop(permit);
            });

            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(joined);
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            log_join_error(joined);
        }
        debug!(worker = "intake", %integration_type, "Receive loop finished");
    }

    async fn handle_message(pipeline: &dyn Pipeline, message: QueueMessage, stats: &IntakeStats) {
        match pipeline.on_message(message).await {
            Ok(Some(_)) => {
                stats.stored.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = "intake",
                    integration_type = %pipeline.integration_type(),
                    error = %err,
                    error_kind = err.label(),
                    "Failed to store inbound message"
                );
            }
        }
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        warn!(worker = "intake", error = %err, "Message handler task failed");
    }
}

/// Ensure the loop is cancelled when the worker is dropped
impl Drop for IntakeWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(
                worker = "intake",
                event = "drop_cancel",
                "IntakeWorker dropped while running; cancelling"
            );
            self.cancellation_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use hubrelay_core::TickReport;
    use hubrelay_domain::{HubRelayError, IntegrationRecord, IntegrationType, Result};

    use super::*;
    use crate::queue::ChannelMessageSource;

    /// Stores bodies `"ok"`, drops `"bad"`, fails on anything else.
    #[derive(Default)]
    struct ScriptedPipeline {
        active: AtomicUsize,
        peak: AtomicUsize,
        delay_ms: u64,
    }

    #[async_trait]
    impl Pipeline for ScriptedPipeline {
        fn integration_type(&self) -> IntegrationType {
            IntegrationType::UpdateProductPrice
        }

        async fn on_tick(&self) -> Result<TickReport> {
            Ok(TickReport::default())
        }

        async fn on_message(&self, message: QueueMessage) -> Result<Option<IntegrationRecord>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match message.body.as_str() {
                "ok" => Ok(Some(
                    IntegrationRecord::pending("A", IntegrationType::UpdateProductPrice, "{}")
                        .unwrap(),
                )),
                "bad" => Ok(None),
                _ => Err(HubRelayError::Database("disk full".into())),
            }
        }
    }

    fn config(max: usize) -> IntakeWorkerConfig {
        IntakeWorkerConfig { max_concurrent_messages: max, join_timeout: Duration::from_secs(2) }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn counts_outcomes_and_finishes_when_source_closes() {
        let (sender, source) = ChannelMessageSource::channel("price", 8);
        for body in ["ok", "bad", "boom", "ok"] {
            sender.publish(QueueMessage::new(body, "A")).await.unwrap();
        }
        drop(sender);

        let mut worker =
            IntakeWorker::new(Arc::new(ScriptedPipeline::default()), Arc::new(source), config(2))
                .unwrap();
        worker.start().unwrap();
        worker.join().await.unwrap();

        assert_eq!(worker.stats().received(), 4);
        assert_eq!(worker.stats().stored(), 2);
        assert_eq!(worker.stats().dropped(), 1);
        assert_eq!(worker.stats().failed(), 1);
        assert!(!worker.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrency_never_exceeds_the_bound() {
        let (sender, source) = ChannelMessageSource::channel("price", 32);
        for _ in 0..12 {
            sender.publish(QueueMessage::new("ok", "A")).await.unwrap();
        }
        drop(sender);

        let pipeline = Arc::new(ScriptedPipeline { delay_ms: 20, ..Default::default() });
        let mut worker = IntakeWorker::new(pipeline.clone(), Arc::new(source), config(3)).unwrap();
        worker.start().unwrap();
        worker.join().await.unwrap();

        assert_eq!(worker.stats().stored(), 12);
        let peak = pipeline.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 2, "messages should overlap, peak {peak}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_cancels_an_idle_worker() {
        let (sender, source) = ChannelMessageSource::channel("price", 1);
        let mut worker =
            IntakeWorker::new(Arc::new(ScriptedPipeline::default()), Arc::new(source), config(1))
                .unwrap();

        worker.start().unwrap();
        assert!(matches!(worker.start(), Err(SchedulerError::AlreadyRunning)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.stop().await.unwrap();

        assert!(!worker.is_running());
        assert!(matches!(worker.stop().await, Err(SchedulerError::NotRunning)));
        drop(sender);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let (_sender, source) = ChannelMessageSource::channel("price", 1);

        let result =
            IntakeWorker::new(Arc::new(ScriptedPipeline::default()), Arc::new(source), config(0));

        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }
}
