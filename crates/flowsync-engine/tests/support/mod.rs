//! Shared wiring for engine integration tests: a fully assembled engine on
//! the in-memory storage backend.

// Each integration test binary uses its own subset of this harness.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use flowsync_engine::backpressure::BackpressureController;
use flowsync_engine::config::EngineConfig;
use flowsync_engine::consumer::{ConsumerHandle, JobConsumer};
use flowsync_engine::dlq::DeadLetterSink;
use flowsync_engine::handlers::HandlerRegistry;
use flowsync_engine::heartbeat::HeartbeatMonitor;
use flowsync_engine::idempotency::IdempotencyStore;
use flowsync_engine::metrics::EngineMetrics;
use flowsync_engine::orchestrator::Orchestrator;
use flowsync_engine::publisher::JobPublisher;
use flowsync_engine::result_handler::ResultHandler;
use flowsync_engine::scheduler::Scheduler;
use flowsync_engine::store::{EngineStore, JobQueue, MemoryQueue, MemoryStore};
use flowsync_events::{CompletionSignals, EventBus};

pub struct TestEngine {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
    pub publisher: Arc<JobPublisher>,
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub idempotency: Arc<IdempotencyStore>,
    pub dlq: Arc<DeadLetterSink>,
    pub metrics: Arc<EngineMetrics>,
    pub bus: Arc<EventBus>,
    pub consumer: ConsumerHandle,
    pub cancel: CancellationToken,
}

/// Test defaults: small timeouts, fast polling.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(20),
        orchestrator_timeout: Duration::from_secs(5),
        scheduler_tick: Duration::from_secs(60),
        ..EngineConfig::default()
    }
}

/// Assemble a running engine over fresh in-memory storage.
pub fn engine(config: EngineConfig) -> TestEngine {
    engine_with_registry(config, None)
}

/// Same, with a registry override for tests injecting custom handlers.
pub fn engine_with_registry(
    config: EngineConfig,
    registry: Option<HandlerRegistry>,
) -> TestEngine {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let store_dyn: Arc<dyn EngineStore> = store.clone();
    let queue_dyn: Arc<dyn JobQueue> = queue.clone();

    let idempotency = Arc::new(IdempotencyStore::new(config.idempotency_ttl));
    let backpressure = Arc::new(BackpressureController::new(config.backpressure));
    let metrics = Arc::new(EngineMetrics::new());
    let bus = Arc::new(EventBus::default());
    let signals = Arc::new(CompletionSignals::new());
    let dlq = Arc::new(DeadLetterSink::new());
    let heartbeat = Arc::new(HeartbeatMonitor::new(config.heartbeat_stall));

    let publisher = Arc::new(JobPublisher::new(
        store_dyn.clone(),
        queue_dyn.clone(),
        idempotency.clone(),
        backpressure,
        metrics.clone(),
    ));

    let results = Arc::new(ResultHandler::new(
        store_dyn.clone(),
        publisher.clone(),
        signals.clone(),
        bus.clone(),
        metrics.clone(),
    ));

    let registry = Arc::new(registry.unwrap_or_else(|| {
        HandlerRegistry::with_defaults(reqwest::Client::new(), config.max_delay_ms)
    }));

    let consumer = Arc::new(JobConsumer::new(
        &config,
        store_dyn.clone(),
        queue_dyn.clone(),
        registry,
        results,
        idempotency.clone(),
        heartbeat,
        dlq.clone(),
        metrics.clone(),
        bus.clone(),
    ));

    let cancel = CancellationToken::new();
    let handle = consumer.spawn(cancel.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        store_dyn.clone(),
        publisher.clone(),
        signals,
        bus.clone(),
        metrics.clone(),
        config.orchestrator_timeout,
    ));

    let scheduler = Arc::new(Scheduler::new(
        store_dyn,
        orchestrator.clone(),
        bus.clone(),
        config.scheduler_tick,
    ));

    TestEngine {
        store,
        queue,
        publisher,
        orchestrator,
        scheduler,
        idempotency,
        dlq,
        metrics,
        bus,
        consumer: handle,
        cancel,
    }
}
