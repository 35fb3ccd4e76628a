//! Fixed-period tick scheduler for one integration pipeline.
//!
//! Each firing runs [`Pipeline::on_tick`] under a timeout. A failed or
//! timed-out tick is logged and the next firing retries independently;
//! records that were not dispatched simply stay `PENDING`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hubrelay_core::Pipeline;
//! use hubrelay_infra::scheduling::{
//!     IntegrationScheduler, IntegrationSchedulerConfig, SchedulerResult,
//! };
//!
//! # async fn example(pipeline: Arc<dyn Pipeline>) -> SchedulerResult<()> {
//! let config = IntegrationSchedulerConfig {
//!     period: Duration::from_secs(60),
//!     ..Default::default()
//! };
//! let mut scheduler = IntegrationScheduler::new(pipeline, config)?;
//!
//! scheduler.start()?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hubrelay_core::Pipeline;
use hubrelay_domain::IntegrationSettings;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::{SchedulerError, SchedulerResult};

/// Configuration for an integration scheduler.
#[derive(Debug, Clone)]
pub struct IntegrationSchedulerConfig {
    /// Time between tick starts.
    pub period: Duration,
    /// Upper bound for a single tick.
    pub tick_timeout: Duration,
    /// Timeout for awaiting the loop task on stop.
    pub join_timeout: Duration,
}

impl Default for IntegrationSchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            tick_timeout: Duration::from_secs(300),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl IntegrationSchedulerConfig {
    /// Period from the type's settings; other values keep their defaults.
    pub fn from_settings(settings: &IntegrationSettings) -> Self {
        Self { period: Duration::from_millis(settings.timer_period_ms), ..Self::default() }
    }
}

/// Per-type tick scheduler with explicit lifecycle management.
pub struct IntegrationScheduler {
    pipeline: Arc<dyn Pipeline>,
    config: IntegrationSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    completed_ticks: Arc<AtomicU64>,
}

impl IntegrationScheduler {
    /// Create a stopped scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] for a zero period or tick
    /// timeout.
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        config: IntegrationSchedulerConfig,
    ) -> SchedulerResult<Self> {
        if config.period.is_zero() {
            return Err(SchedulerError::InvalidConfig("period must be greater than 0".into()));
        }
        if config.tick_timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig("tick_timeout must be greater than 0".into()));
        }

        Ok(Self {
            pipeline,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: None,
            completed_ticks: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Spawn the tick loop. The first tick fires immediately.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self), fields(integration_type = %self.pipeline.integration_type()))]
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        // A fresh token supports restart after stop
        self.cancellation_token = CancellationToken::new();

        let pipeline = Arc::clone(&self.pipeline);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();
        let completed = Arc::clone(&self.completed_ticks);

        self.task_handle = Some(tokio::spawn(async move {
            Self::tick_loop(pipeline, config, cancel, completed).await;
        }));

        info!(
            scheduler = "integration",
            event = "start",
            period_ms = u64::try_from(self.config.period.as_millis()).unwrap_or(u64::MAX),
            "Integration scheduler started"
        );
        Ok(())
    }

    /// Cancel the loop and wait for it to finish.
    ///
    /// A tick in flight is abandoned; its undispatched records stay pending.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running or the loop does not finish
    /// within the join timeout
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

        info!(scheduler = "integration", event = "stop", "Integration scheduler stopped");
        Ok(())
    }

    /// True while the loop task is alive.
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Ticks that ran to completion (successfully or with an error).
    pub fn completed_ticks(&self) -> u64 {
        self.completed_ticks.load(Ordering::Relaxed)
    }

    async fn tick_loop(
        pipeline: Arc<dyn Pipeline>,
        config: IntegrationSchedulerConfig,
        cancel: CancellationToken,
        completed: Arc<AtomicU64>,
    ) {
        let integration_type = pipeline.integration_type();
        let mut ticker = tokio::time::interval(config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(scheduler = "integration", %integration_type, "Tick loop cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    warn!(
                        scheduler = "integration",
                        event = "tick_abandoned",
                        %integration_type,
                        "Tick abandoned on shutdown"
                    );
                    break;
                }
                outcome = tokio::time::timeout(config.tick_timeout, pipeline.on_tick()) => outcome,
            };

            match outcome {
                Ok(Ok(report)) if report.is_idle() => {
                    debug!(scheduler = "integration", %integration_type, "No pending records");
                }
                Ok(Ok(report)) => {
                    info!(
                        scheduler = "integration",
                        event = "tick_complete",
                        %integration_type,
                        partitions = report.partitions,
                        batches = report.batches_dispatched,
                        done = report.records_done,
                        pending = report.records_pending,
                        deferred = report.records_deferred,
                        skipped = report.payloads_skipped,
                        elapsed_ms =
                            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Tick finished"
                    );
                }
                Ok(Err(err)) => {
                    error!(
                        scheduler = "integration",
                        event = "tick_failed",
                        %integration_type,
                        error = %err,
                        error_kind = err.label(),
                        "Tick aborted"
                    );
                }
                Err(_) => {
                    warn!(
                        scheduler = "integration",
                        event = "tick_timeout",
                        %integration_type,
                        timeout_secs = config.tick_timeout.as_secs(),
                        "Tick timed out"
                    );
                }
            }
            completed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Ensure the loop is cancelled when the scheduler is dropped
impl Drop for IntegrationScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(
                scheduler = "integration",
                event = "drop_cancel",
                "IntegrationScheduler dropped while running; cancelling"
            );
            self.cancellation_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use hubrelay_core::{QueueMessage, TickReport};
    use hubrelay_domain::{HubRelayError, IntegrationRecord, IntegrationType, Result};

    use super::*;

    struct CountingPipeline {
        ticks: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingPipeline {
        fn new(fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self { ticks: AtomicUsize::new(0), fail, delay })
        }
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        fn integration_type(&self) -> IntegrationType {
            IntegrationType::UpdateStock
        }

        async fn on_tick(&self) -> Result<TickReport> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(HubRelayError::Database("store offline".into()))
            } else {
                Ok(TickReport::default())
            }
        }

        async fn on_message(&self, _message: QueueMessage) -> Result<Option<IntegrationRecord>> {
            Ok(None)
        }
    }

    fn fast_config() -> IntegrationSchedulerConfig {
        IntegrationSchedulerConfig {
            period: Duration::from_millis(10),
            tick_timeout: Duration::from_millis(200),
            join_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_lifecycle() {
        let pipeline = CountingPipeline::new(false, Duration::ZERO);
        let mut scheduler = IntegrationScheduler::new(pipeline.clone(), fast_config()).unwrap();

        assert!(!scheduler.is_running());
        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.stop().await.unwrap();

        assert!(!scheduler.is_running());
        assert!(pipeline.ticks.load(Ordering::SeqCst) >= 2);
        assert!(scheduler.completed_ticks() >= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_double_start_and_idle_stop_fail() {
        let pipeline = CountingPipeline::new(false, Duration::ZERO);
        let mut scheduler = IntegrationScheduler::new(pipeline, fast_config()).unwrap();

        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));

        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyRunning)));
        scheduler.stop().await.unwrap();

        // Restart after stop is allowed
        scheduler.start().unwrap();
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_ticks_keep_the_loop_alive() {
        let pipeline = CountingPipeline::new(true, Duration::ZERO);
        let mut scheduler = IntegrationScheduler::new(pipeline.clone(), fast_config()).unwrap();

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(scheduler.is_running());
        assert!(pipeline.ticks.load(Ordering::SeqCst) >= 2);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_ticks_time_out_and_the_next_tick_runs() {
        let pipeline = CountingPipeline::new(false, Duration::from_secs(10));
        let config = IntegrationSchedulerConfig {
            tick_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let mut scheduler = IntegrationScheduler::new(pipeline.clone(), config).unwrap();

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.stop().await.unwrap();

        assert!(pipeline.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_abandons_a_tick_in_flight() {
        let pipeline = CountingPipeline::new(false, Duration::from_secs(10));
        let config =
            IntegrationSchedulerConfig { tick_timeout: Duration::from_secs(30), ..fast_config() };
        let mut scheduler = IntegrationScheduler::new(pipeline, config).unwrap();

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        scheduler.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(scheduler.completed_ticks(), 0);
    }

    #[test]
    fn zero_period_is_rejected() {
        let pipeline = CountingPipeline::new(false, Duration::ZERO);
        let config = IntegrationSchedulerConfig { period: Duration::ZERO, ..fast_config() };

        assert!(matches!(
            IntegrationScheduler::new(pipeline, config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_period_comes_from_settings() {
        let settings = IntegrationSettings { timer_period_ms: 1_500, ..Default::default() };

        assert_eq!(
            IntegrationSchedulerConfig::from_settings(&settings).period,
            Duration::from_millis(1_500)
        );
    }
}
