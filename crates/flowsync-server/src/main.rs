//! FlowSync daemon entry point.
//!
//! Startup order: database ready -> queue -> consumer -> scheduler.
//! Shutdown order: scheduler -> consumer (drain) -> sweeper -> audit flush.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowsync_engine::backpressure::BackpressureController;
use flowsync_engine::config::EngineConfig;
use flowsync_engine::consumer::JobConsumer;
use flowsync_engine::dlq::DeadLetterSink;
use flowsync_engine::handlers::HandlerRegistry;
use flowsync_engine::heartbeat::HeartbeatMonitor;
use flowsync_engine::idempotency::IdempotencyStore;
use flowsync_engine::logbuf::{LogBuffer, LogLevel};
use flowsync_engine::metrics::EngineMetrics;
use flowsync_engine::orchestrator::Orchestrator;
use flowsync_engine::publisher::JobPublisher;
use flowsync_engine::result_handler::ResultHandler;
use flowsync_engine::scheduler::Scheduler;
use flowsync_engine::store::{EngineStore, JobQueue, PgQueue, PgStore};
use flowsync_events::{AuditPersistence, CompletionSignals, EventBus};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowsync=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = EngineConfig::from_env();
    tracing::info!(
        max_concurrency = config.max_concurrency,
        scheduler_tick_ms = config.scheduler_tick.as_millis() as u64,
        "Loaded engine configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = flowsync_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    flowsync_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    flowsync_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Shared components ---
    let store: Arc<dyn EngineStore> = Arc::new(PgStore::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(PgQueue::new(pool.clone()));

    let idempotency = Arc::new(IdempotencyStore::new(config.idempotency_ttl));
    let backpressure = Arc::new(BackpressureController::new(config.backpressure));
    let metrics = Arc::new(EngineMetrics::new());
    let bus = Arc::new(EventBus::default());
    let signals = Arc::new(CompletionSignals::new());
    let dlq = Arc::new(DeadLetterSink::new());
    let heartbeat = Arc::new(HeartbeatMonitor::new(config.heartbeat_stall));

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client");
    let registry = Arc::new(HandlerRegistry::with_defaults(
        http_client,
        config.max_delay_ms,
    ));

    let publisher = Arc::new(JobPublisher::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        Arc::clone(&idempotency),
        backpressure,
        Arc::clone(&metrics),
    ));

    let results = Arc::new(ResultHandler::new(
        Arc::clone(&store),
        Arc::clone(&publisher),
        Arc::clone(&signals),
        Arc::clone(&bus),
        Arc::clone(&metrics),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&publisher),
        Arc::clone(&signals),
        Arc::clone(&bus),
        Arc::clone(&metrics),
        config.orchestrator_timeout,
    ));

    // --- Background services ---
    let audit_handle = tokio::spawn(AuditPersistence::run(pool.clone(), bus.subscribe()));

    // Mirror engine events into the in-memory log ring for inspection.
    let log_ring = Arc::new(LogBuffer::default());
    let log_ring_handle = {
        let ring = Arc::clone(&log_ring);
        let mut receiver = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let level = if event.event.ends_with(".failed")
                            || event.event == "dlq.entry"
                        {
                            LogLevel::Warn
                        } else {
                            LogLevel::Info
                        };
                        ring.push(
                            level,
                            format!("{} entity={:?}", event.event, event.entity_id),
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let sweeper_cancel = CancellationToken::new();
    let sweeper_handle =
        idempotency.spawn_sweeper(config.idempotency_sweep_interval, sweeper_cancel.clone());

    let consumer = Arc::new(JobConsumer::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&queue),
        registry,
        results,
        Arc::clone(&idempotency),
        heartbeat,
        dlq,
        Arc::clone(&metrics),
        Arc::clone(&bus),
    ));
    let consumer_handle = consumer.spawn(CancellationToken::new());

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        orchestrator,
        Arc::clone(&bus),
        config.scheduler_tick,
    ));
    let scheduler_cancel = CancellationToken::new();
    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = scheduler_cancel.clone();
        tokio::spawn(async move {
            scheduler.run(cancel).await;
        })
    };

    tracing::info!("FlowSync engine running");

    // --- Wait for a termination signal ---
    shutdown_signal().await;

    // --- Ordered shutdown ---
    tracing::info!("Shutting down");

    // Stop firing new executions first.
    scheduler_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_task).await;
    tracing::info!("Scheduler stopped");

    // Drain the worker pool.
    consumer_handle.shutdown().await;

    // Stop the idempotency sweeper.
    sweeper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;

    // Release every bus handle so audit persistence sees the channel close,
    // drains, and exits.
    drop(scheduler);
    drop(consumer);
    drop(bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), audit_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), log_ring_handle).await;
    tracing::info!(
        buffered_log_entries = log_ring.len(),
        "Audit persistence flushed"
    );

    let snapshot = metrics.snapshot();
    tracing::info!(
        executions_started = snapshot.executions_started,
        executions_completed = snapshot.executions_completed,
        executions_failed = snapshot.executions_failed,
        jobs_processed = snapshot.jobs_processed,
        "Graceful shutdown complete"
    );
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the daemon shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
