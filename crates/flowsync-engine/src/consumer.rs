//! Job consumer: the bounded worker pool.
//!
//! Up to `max_concurrency` workers share the queue; each owns one job at a
//! time. Idle workers wait on the queue's enqueue notifier with the poll
//! interval as a fallback. The pool also runs a stale-lock scavenger that
//! returns rows abandoned by crashed workers to the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use flowsync_events::{EngineEvent, EventBus};

use crate::config::EngineConfig;
use crate::dlq::DeadLetterSink;
use crate::handlers::HandlerRegistry;
use crate::heartbeat::HeartbeatMonitor;
use crate::idempotency::IdempotencyStore;
use crate::job::{ResultStatus, WorkerJob, WorkerResult};
use crate::metrics::EngineMetrics;
use crate::result_handler::ResultHandler;
use crate::store::{EngineStore, JobQueue};

/// Dispatches queued jobs to handlers under a hard concurrency cap.
pub struct JobConsumer {
    store: Arc<dyn EngineStore>,
    queue: Arc<dyn JobQueue>,
    registry: Arc<HandlerRegistry>,
    results: Arc<ResultHandler>,
    idempotency: Arc<IdempotencyStore>,
    heartbeat: Arc<HeartbeatMonitor>,
    dlq: Arc<DeadLetterSink>,
    metrics: Arc<EngineMetrics>,
    bus: Arc<EventBus>,
    max_concurrency: usize,
    poll_interval: Duration,
    drain_timeout: Duration,
    reclaim_interval: Duration,
    reclaim_threshold: Duration,
}

impl JobConsumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn EngineStore>,
        queue: Arc<dyn JobQueue>,
        registry: Arc<HandlerRegistry>,
        results: Arc<ResultHandler>,
        idempotency: Arc<IdempotencyStore>,
        heartbeat: Arc<HeartbeatMonitor>,
        dlq: Arc<DeadLetterSink>,
        metrics: Arc<EngineMetrics>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            results,
            idempotency,
            heartbeat,
            dlq,
            metrics,
            bus,
            max_concurrency: config.max_concurrency,
            poll_interval: config.poll_interval,
            drain_timeout: config.drain_timeout,
            reclaim_interval: config.reclaim_interval,
            reclaim_threshold: config.reclaim_threshold,
        }
    }

    /// Launch the worker pool and the stale-lock scavenger.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> ConsumerHandle {
        let mut tasks = Vec::with_capacity(self.max_concurrency + 1);

        for i in 0..self.max_concurrency {
            let consumer = Arc::clone(self);
            let cancel = cancel.clone();
            let worker_id = format!("worker-{i}-{}", Uuid::new_v4());
            tasks.push(tokio::spawn(async move {
                consumer.worker_loop(worker_id, cancel).await;
            }));
        }

        let consumer = Arc::clone(self);
        let scavenger_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            consumer.scavenger_loop(scavenger_cancel).await;
        }));

        tracing::info!(
            workers = self.max_concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job consumer started"
        );

        ConsumerHandle {
            cancel,
            tasks,
            drain_timeout: self.drain_timeout,
        }
    }

    async fn worker_loop(&self, worker_id: String, cancel: CancellationToken) {
        let notify = self.queue.notifier();
        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.queue.dequeue(&worker_id).await {
                Ok(Some(job)) => {
                    self.process(&worker_id, job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = notify.notified() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(worker_id = %worker_id, error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
        tracing::debug!(worker_id = %worker_id, "Worker stopped");
    }

    /// Run one claimed job to a terminal outcome.
    async fn process(&self, worker_id: &str, job: WorkerJob) {
        let job_id = job.id;
        self.heartbeat
            .register(job_id, job.execution_id, &job.node.label);

        // A cancellation or branch skip may have settled the step between
        // publication and dispatch; such jobs must not run.
        let runnable = match self.store.mark_step_running(job_id, job.attempt as i32).await {
            Ok(runnable) => runnable,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to mark step running");
                false
            }
        };
        if !runnable {
            if let Err(e) = self
                .queue
                .mark_failed(job_id, "Step was no longer pending at dispatch")
                .await
            {
                tracing::error!(job_id, error = %e, "Failed to mark abandoned job");
            }
            self.heartbeat.deregister(job_id);
            return;
        }

        tracing::debug!(
            worker_id = %worker_id,
            job_id,
            execution_id = job.execution_id,
            node_id = %job.node.id,
            attempt = job.attempt,
            "Job dispatched"
        );

        let result = match self.registry.get(job.node.node_type.as_str()) {
            Some(handler) => handler.execute(&job).await,
            None => WorkerResult::failed(
                &job,
                format!(
                    "No handler registered for node type \"{}\"",
                    job.node.node_type
                ),
                Some(false),
                0,
            ),
        };
        self.heartbeat.beat(job_id);

        let queue_write = match result.status {
            ResultStatus::Completed => {
                self.queue
                    .mark_done(job_id, result.result.as_ref().unwrap_or(&Value::Null))
                    .await
            }
            ResultStatus::Failed => {
                self.queue
                    .mark_failed(job_id, result.error.as_deref().unwrap_or("unknown error"))
                    .await
            }
        };
        if let Err(e) = queue_write {
            tracing::error!(job_id, error = %e, "Failed to record queue outcome");
        }

        // Retry decision. A failed attempt with retries left re-enters the
        // queue after backoff and never reaches the result handler.
        let retryable = result.retryable.unwrap_or(true);
        if result.is_failed() && retryable && job.attempt <= job.max_retries {
            self.schedule_retry(job, result).await;
            self.heartbeat.deregister(job_id);
            return;
        }

        if result.is_failed() && job.max_retries > 0 {
            let error = result.error.clone().unwrap_or_default();
            self.dlq.add(job.clone(), error.clone(), job.attempt);
            self.metrics.dlq_entry();
            self.bus.publish(
                EngineEvent::new("dlq.entry")
                    .with_entity("step", job_id)
                    .with_payload(json!({
                        "executionId": job.execution_id,
                        "nodeId": job.node.id,
                        "attempts": job.attempt,
                        "error": error,
                    })),
            );
        }

        self.metrics.job_processed();
        if let Err(e) = self.results.handle(result).await {
            tracing::error!(job_id, error = %e, "Result handling failed");
        }
        self.heartbeat.deregister(job_id);
    }

    /// Reset the step, clear the idempotency key, and re-enqueue the next
    /// attempt after backoff. The key must be cleared before the enqueue or
    /// the fresh attempt would be rejected as a duplicate.
    async fn schedule_retry(&self, job: WorkerJob, result: WorkerResult) {
        let delay = job.retry.delay_for_attempt(job.attempt);
        let error = result.error.unwrap_or_else(|| "unknown error".to_string());
        let message = format!("Retry {}/{}: {}", job.attempt, job.max_retries, error);

        if let Err(e) = self
            .store
            .reset_step_for_retry(job.id, &message, job.attempt as i32)
            .await
        {
            tracing::error!(job_id = job.id, error = %e, "Failed to reset step for retry");
            return;
        }

        self.idempotency.remove(&job.idempotency_key());
        self.metrics.retry();

        tracing::info!(
            job_id = job.id,
            execution_id = job.execution_id,
            node_id = %job.node.id,
            attempt = job.attempt,
            max_retries = job.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );

        let queue = Arc::clone(&self.queue);
        let mut next = job;
        next.attempt += 1;
        let max_attempts = (next.max_retries + 1) as i32;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.enqueue(&next, max_attempts).await {
                tracing::error!(job_id = next.id, error = %e, "Failed to enqueue retry");
            }
        });
    }

    /// Periodically return rows abandoned in `processing` to the queue.
    async fn scavenger_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.reclaim_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let threshold = chrono::Duration::from_std(self.reclaim_threshold)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60));
                    match self.queue.reclaim_stale(Utc::now() - threshold).await {
                        Ok((0, 0)) => {}
                        Ok((reclaimed, failed)) => {
                            tracing::warn!(reclaimed, failed, "Reclaimed stale queue locks");
                        }
                        Err(e) => tracing::error!(error = %e, "Stale-lock reclaim failed"),
                    }
                }
            }
        }
    }
}

/// Running consumer pool; dropping it does not stop the workers, call
/// [`ConsumerHandle::shutdown`].
pub struct ConsumerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl ConsumerHandle {
    /// Stop dispatching and wait up to the drain timeout for in-flight
    /// jobs. Jobs still running afterwards keep their `processing` rows;
    /// the scavenger of a future instance will reclaim them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.drain_timeout;

        for task in self.tasks {
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                tracing::warn!("Consumer drain timeout expired with jobs still in flight");
                return;
            }
        }
        tracing::info!("Job consumer drained");
    }
}
