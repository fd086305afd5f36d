//! Storage abstraction for the engine.
//!
//! The engine components speak to two object-safe traits: [`EngineStore`]
//! for workflow/execution/step/trigger state and [`JobQueue`] for the
//! durable FIFO. [`postgres`] adapts the `flowsync-db` repositories;
//! [`memory`] is a semantics-preserving in-process backend used by tests
//! and local development.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryQueue, MemoryStore};
pub use postgres::{PgQueue, PgStore};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use flowsync_core::error::CoreError;
use flowsync_core::types::{DbId, Timestamp};
use flowsync_db::models::{Execution, QueueStats, StepExecution, Trigger, Workflow};

use crate::job::WorkerJob;

/// State store for workflows, executions, steps, and triggers.
#[async_trait]
pub trait EngineStore: Send + Sync {
    // -- Workflows ----------------------------------------------------------

    async fn find_workflow(&self, id: DbId) -> Result<Option<Workflow>, CoreError>;

    // -- Executions ---------------------------------------------------------

    /// Create an execution in `running` status.
    async fn create_execution(
        &self,
        workflow_id: DbId,
        input: &Value,
        triggered_by: Option<&str>,
    ) -> Result<Execution, CoreError>;

    async fn find_execution(&self, id: DbId) -> Result<Option<Execution>, CoreError>;

    /// Terminal transitions return `false` when the execution was already
    /// terminal (sticky states) and nothing was written.
    async fn complete_execution(&self, id: DbId, output: &Value) -> Result<bool, CoreError>;

    async fn fail_execution(&self, id: DbId, error: &str) -> Result<bool, CoreError>;

    async fn cancel_execution(&self, id: DbId) -> Result<bool, CoreError>;

    // -- Steps --------------------------------------------------------------

    /// Create a step row in `pending` status.
    async fn create_step(
        &self,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
        attempts: i32,
    ) -> Result<StepExecution, CoreError>;

    /// Create a step row directly in `skipped` status.
    async fn create_skipped_step(
        &self,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
    ) -> Result<StepExecution, CoreError>;

    async fn find_step(&self, id: DbId) -> Result<Option<StepExecution>, CoreError>;

    async fn list_steps(&self, execution_id: DbId) -> Result<Vec<StepExecution>, CoreError>;

    /// Pending -> running, stamping the attempt ordinal. `false` when the
    /// step was concurrently settled and must not run.
    async fn mark_step_running(&self, id: DbId, attempts: i32) -> Result<bool, CoreError>;

    async fn complete_step(&self, id: DbId, result: &Value) -> Result<(), CoreError>;

    async fn fail_step(&self, id: DbId, error: &str) -> Result<(), CoreError>;

    /// Back to `pending` ahead of a retry attempt.
    async fn reset_step_for_retry(
        &self,
        id: DbId,
        error: &str,
        attempts: i32,
    ) -> Result<(), CoreError>;

    /// Sweep pending/running steps of an execution to `skipped`.
    async fn skip_unsettled_steps(&self, execution_id: DbId) -> Result<u64, CoreError>;

    /// Remove a step row (duplicate-publication rollback).
    async fn delete_step(&self, id: DbId) -> Result<(), CoreError>;

    // -- Triggers -----------------------------------------------------------

    async fn list_enabled_cron_triggers(&self) -> Result<Vec<Trigger>, CoreError>;

    async fn record_trigger_fired(
        &self,
        id: DbId,
        fired_at: Timestamp,
        next_run_at: Option<Timestamp>,
    ) -> Result<(), CoreError>;
}

/// The durable FIFO the consumer pool feeds from.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert (or re-arm, for retries reusing the same step id) a pending
    /// row and wake one idle worker via the in-process notifier.
    async fn enqueue(&self, job: &WorkerJob, max_attempts: i32) -> Result<(), CoreError>;

    /// Claim the oldest pending job for a worker. `None` means the queue is
    /// empty, not an error. The claim must be exclusive across concurrent
    /// callers.
    async fn dequeue(&self, worker_id: &str) -> Result<Option<WorkerJob>, CoreError>;

    async fn mark_done(&self, id: DbId, result: &Value) -> Result<(), CoreError>;

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<(), CoreError>;

    /// Live count of pending rows.
    async fn depth(&self) -> Result<i64, CoreError>;

    async fn stats(&self) -> Result<QueueStats, CoreError>;

    /// Reset rows stuck in `processing` with locks older than `older_than`.
    /// Returns `(reclaimed, failed)` counts.
    async fn reclaim_stale(&self, older_than: Timestamp) -> Result<(u64, u64), CoreError>;

    /// In-process wakeup fired on every enqueue, letting idle workers react
    /// faster than the poll interval.
    fn notifier(&self) -> Arc<Notify>;
}
