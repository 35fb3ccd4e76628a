//! Application context - dependency injection container

use std::collections::BTreeMap;
use std::sync::Arc;

use hubrelay_core::{
    HubService, IntegrationPipeline, Pipeline, RecordStore, ResilientExecutor, TokenManager,
};
use hubrelay_domain::{
    BridgeConfig, HubRelayError, IntegrationSettings, IntegrationType, ProductPriceUpdate, Result,
    StockUpdate,
};
use hubrelay_infra::queue::{ChannelMessageSource, IntakeWorker, IntakeWorkerConfig, QueueSender};
use hubrelay_infra::scheduling::IntegrationSchedulerConfig;
use hubrelay_infra::{
    DbManager, HttpHubClient, IntegrationScheduler, MokaTokenCache, SqliteIntegrationRepository,
};
use tracing::{error, info};

/// Buffered messages per in-process queue.
const QUEUE_CAPACITY: usize = 1024;

/// Timer, intake worker and queue of one enabled integration type.
struct IntegrationRuntime {
    integration_type: IntegrationType,
    scheduler: IntegrationScheduler,
    worker: IntakeWorker,
    sender: QueueSender,
}

/// Application context - holds all services and runtimes
pub struct AppContext {
    pub config: BridgeConfig,
    pub db: Arc<DbManager>,
    pub records: Arc<SqliteIntegrationRepository>,
    pub hub: Arc<HubService>,
    runtimes: Vec<IntegrationRuntime>,
}

impl AppContext {
    /// Wire every service from configuration. Nothing runs until
    /// [`AppContext::start`].
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be opened, the hub client cannot be
    /// built, or an enabled integration type has no hub dispatcher.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let db = Arc::new(DbManager::open(&config.database)?);
        let records = Arc::new(SqliteIntegrationRepository::new(Arc::clone(&db)));

        let client = Arc::new(HttpHubClient::new(&config.hub)?);
        let cache = Arc::new(MokaTokenCache::new(&config.token_cache));
        let tokens = TokenManager::new(client.clone(), cache, config.hub.partitions.clone());
        let executor = ResilientExecutor::from_settings(&config.resilience)?;
        let hub = Arc::new(HubService::new(client, tokens, executor));

        let store: Arc<dyn RecordStore> = records.clone();
        let mut runtimes = Vec::new();
        for (integration_type, settings) in config.integrations.configured() {
            let pipeline = build_pipeline(integration_type, settings, &store, &hub)?;
            runtimes.push(build_runtime(pipeline, settings, &config)?);
        }

        info!(
            hub_url = %config.hub.url,
            database = %db.path().display(),
            integrations = runtimes.len(),
            "Application context initialized"
        );

        Ok(Self { config, db, records, hub, runtimes })
    }

    /// Start every timer and intake worker.
    ///
    /// # Errors
    ///
    /// Returns the first start failure; runtimes started before it keep
    /// running until [`AppContext::shutdown`].
    pub fn start(&mut self) -> Result<()> {
        for runtime in &mut self.runtimes {
            runtime.scheduler.start()?;
            runtime.worker.start()?;
            info!(
                integration_type = %runtime.integration_type,
                queue = runtime.sender.queue_name(),
                "Integration started"
            );
        }
        Ok(())
    }

    /// Stop every running timer and worker. Failures are logged and do not
    /// prevent the remaining runtimes from stopping.
    pub async fn shutdown(&mut self) {
        for runtime in &mut self.runtimes {
            if runtime.scheduler.is_running() {
                if let Err(err) = runtime.scheduler.stop().await {
                    error!(
                        integration_type = %runtime.integration_type,
                        error = %err,
                        "Failed to stop integration scheduler"
                    );
                }
            }
            if runtime.worker.is_running() {
                if let Err(err) = runtime.worker.stop().await {
                    error!(
                        integration_type = %runtime.integration_type,
                        error = %err,
                        "Failed to stop intake worker"
                    );
                }
            }
        }
        info!("Application context shut down");
    }

    /// Enabled integration types, in configuration order.
    pub fn integration_types(&self) -> Vec<IntegrationType> {
        self.runtimes.iter().map(|runtime| runtime.integration_type).collect()
    }

    /// Publishing handles keyed by queue name.
    pub fn senders(&self) -> BTreeMap<String, QueueSender> {
        self.runtimes
            .iter()
            .map(|runtime| (runtime.sender.queue_name().to_string(), runtime.sender.clone()))
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.runtimes
            .iter()
            .any(|runtime| runtime.scheduler.is_running() || runtime.worker.is_running())
    }
}

/// Pick the payload type and dispatcher for an integration type.
fn build_pipeline(
    integration_type: IntegrationType,
    settings: &IntegrationSettings,
    store: &Arc<dyn RecordStore>,
    hub: &Arc<HubService>,
) -> Result<Arc<dyn Pipeline>> {
    let store = Arc::clone(store);
    match integration_type {
        IntegrationType::UpdateProductPrice => {
            Ok(Arc::new(IntegrationPipeline::<ProductPriceUpdate>::new(
                integration_type,
                settings.batch_limit,
                store,
                hub.clone(),
            )))
        }
        IntegrationType::UpdateStock => Ok(Arc::new(IntegrationPipeline::<StockUpdate>::new(
            integration_type,
            settings.batch_limit,
            store,
            hub.clone(),
        ))),
        IntegrationType::UpdateOrderStatus
        | IntegrationType::UpdateRetailerCredit
        | IntegrationType::SaveRecommendationList => Err(HubRelayError::Config(format!(
            "integration type {integration_type} is configured but has no hub dispatcher"
        ))),
    }
}

fn build_runtime(
    pipeline: Arc<dyn Pipeline>,
    settings: &IntegrationSettings,
    config: &BridgeConfig,
) -> Result<IntegrationRuntime> {
    let integration_type = pipeline.integration_type();
    let queue_name = if settings.queue_name.is_empty() {
        integration_type.to_string()
    } else {
        settings.queue_name.clone()
    };

    let (sender, source) = ChannelMessageSource::channel(queue_name, QUEUE_CAPACITY);
    let scheduler = IntegrationScheduler::new(
        Arc::clone(&pipeline),
        IntegrationSchedulerConfig::from_settings(settings),
    )?;
    let worker = IntakeWorker::new(
        pipeline,
        Arc::new(source),
        IntakeWorkerConfig::from_queue_config(&config.queue),
    )?;

    Ok(IntegrationRuntime { integration_type, scheduler, worker, sender })
}
