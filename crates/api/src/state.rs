//! Shared application state and its wiring.

use std::sync::Arc;

use domain::{InMemorySagaConfigStore, SagaConfigService};
use saga::{
    InMemoryCreditCardService, InMemoryInventoryService, InMemoryLogisticsService, MonitorConfig,
    MonitorManager, OutboxRelay, RecoveryScanner, ResilienceConfig, ResilientServiceClient,
    ResponseHandler, RollbackConfig, RollbackEngine, SagaOrchestrator, TracingNotifier,
    TransactionQuery,
};
use transaction_log::{OutboxStore, TransactionLogStore};

use crate::config::Config;

/// Storage the server can run on.
pub trait SagaStore: TransactionLogStore + OutboxStore + Clone + 'static {}

impl<T: TransactionLogStore + OutboxStore + Clone + 'static> SagaStore for T {}

pub type Engine<S> = RollbackEngine<S, ResilientServiceClient, TracingNotifier>;
pub type Monitors<S> = MonitorManager<S, Engine<S>>;
pub type Relay<S> = OutboxRelay<S, ResilientServiceClient, TracingNotifier>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SagaStore> {
    pub orchestrator: SagaOrchestrator<S, InMemorySagaConfigStore, Monitors<S>>,
    pub query: TransactionQuery<S>,
    pub config_service: Arc<SagaConfigService<InMemorySagaConfigStore>>,
    pub monitors: Arc<Monitors<S>>,
    pub recovery: RecoveryScanner<S, InMemorySagaConfigStore, Monitors<S>>,
    pub responses: ResponseHandler<S>,
    pub client: ResilientServiceClient,
}

/// Wires the saga components on top of `store` with in-memory participants.
///
/// The relay is returned separately; the caller decides whether to run it.
pub fn create_default_state<S: SagaStore>(store: S, config: &Config) -> (Arc<AppState<S>>, Arc<Relay<S>>) {
    let client = ResilientServiceClient::builder(ResilienceConfig::default())
        .participant(InMemoryCreditCardService::new())
        .participant(InMemoryInventoryService::new())
        .participant(InMemoryLogisticsService::new())
        .build();

    let engine = Arc::new(RollbackEngine::new(
        store.clone(),
        client.clone(),
        TracingNotifier,
        RollbackConfig {
            max_retries: config.rollback_max_retries,
            ..RollbackConfig::default()
        },
    ));
    let monitors = Arc::new(MonitorManager::new(
        store.clone(),
        engine,
        MonitorConfig {
            check_interval: config.monitor_check_interval(),
            ..MonitorConfig::default()
        },
    ));
    let config_service = Arc::new(SagaConfigService::new(InMemorySagaConfigStore::default()));

    let state = Arc::new(AppState {
        orchestrator: SagaOrchestrator::new(
            store.clone(),
            Arc::clone(&config_service),
            Arc::clone(&monitors),
        ),
        query: TransactionQuery::new(store.clone()),
        recovery: RecoveryScanner::new(
            store.clone(),
            Arc::clone(&config_service),
            Arc::clone(&monitors),
        ),
        responses: ResponseHandler::new(store.clone()),
        config_service,
        monitors,
        client: client.clone(),
    });
    let relay = Arc::new(OutboxRelay::new(
        store,
        client,
        TracingNotifier,
        config.outbox_batch_size,
    ));

    (state, relay)
}
