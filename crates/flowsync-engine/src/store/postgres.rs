//! PostgreSQL storage backend: thin adapters over the `flowsync-db`
//! repositories. All `sqlx` errors are wrapped into
//! [`CoreError::Infrastructure`] at this boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use flowsync_core::error::CoreError;
use flowsync_core::types::{DbId, Timestamp};
use flowsync_db::models::{Execution, QueueStats, StepExecution, Trigger, Workflow};
use flowsync_db::repositories::{ExecutionRepo, QueueRepo, StepRepo, TriggerRepo, WorkflowRepo};
use flowsync_db::DbPool;

use crate::job::WorkerJob;
use crate::store::{EngineStore, JobQueue};

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

/// [`EngineStore`] backed by the PostgreSQL repositories.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EngineStore for PgStore {
    async fn find_workflow(&self, id: DbId) -> Result<Option<Workflow>, CoreError> {
        WorkflowRepo::find_by_id(&self.pool, id)
            .await
            .map_err(CoreError::infra)
    }

    async fn create_execution(
        &self,
        workflow_id: DbId,
        input: &Value,
        triggered_by: Option<&str>,
    ) -> Result<Execution, CoreError> {
        ExecutionRepo::create(&self.pool, workflow_id, input, triggered_by)
            .await
            .map_err(CoreError::infra)
    }

    async fn find_execution(&self, id: DbId) -> Result<Option<Execution>, CoreError> {
        ExecutionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(CoreError::infra)
    }

    async fn complete_execution(&self, id: DbId, output: &Value) -> Result<bool, CoreError> {
        ExecutionRepo::complete(&self.pool, id, output)
            .await
            .map_err(CoreError::infra)
    }

    async fn fail_execution(&self, id: DbId, error: &str) -> Result<bool, CoreError> {
        ExecutionRepo::fail(&self.pool, id, error)
            .await
            .map_err(CoreError::infra)
    }

    async fn cancel_execution(&self, id: DbId) -> Result<bool, CoreError> {
        ExecutionRepo::cancel(&self.pool, id)
            .await
            .map_err(CoreError::infra)
    }

    async fn create_step(
        &self,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
        attempts: i32,
    ) -> Result<StepExecution, CoreError> {
        StepRepo::create(&self.pool, execution_id, node_id, node_label, node_type, attempts)
            .await
            .map_err(CoreError::infra)
    }

    async fn create_skipped_step(
        &self,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
    ) -> Result<StepExecution, CoreError> {
        StepRepo::create_skipped(&self.pool, execution_id, node_id, node_label, node_type)
            .await
            .map_err(CoreError::infra)
    }

    async fn find_step(&self, id: DbId) -> Result<Option<StepExecution>, CoreError> {
        StepRepo::find_by_id(&self.pool, id)
            .await
            .map_err(CoreError::infra)
    }

    async fn list_steps(&self, execution_id: DbId) -> Result<Vec<StepExecution>, CoreError> {
        StepRepo::list_by_execution(&self.pool, execution_id)
            .await
            .map_err(CoreError::infra)
    }

    async fn mark_step_running(&self, id: DbId, attempts: i32) -> Result<bool, CoreError> {
        StepRepo::mark_running(&self.pool, id, attempts)
            .await
            .map_err(CoreError::infra)
    }

    async fn complete_step(&self, id: DbId, result: &Value) -> Result<(), CoreError> {
        StepRepo::mark_completed(&self.pool, id, result)
            .await
            .map_err(CoreError::infra)
    }

    async fn fail_step(&self, id: DbId, error: &str) -> Result<(), CoreError> {
        StepRepo::mark_failed(&self.pool, id, error)
            .await
            .map_err(CoreError::infra)
    }

    async fn reset_step_for_retry(
        &self,
        id: DbId,
        error: &str,
        attempts: i32,
    ) -> Result<(), CoreError> {
        StepRepo::reset_for_retry(&self.pool, id, error, attempts)
            .await
            .map_err(CoreError::infra)
    }

    async fn skip_unsettled_steps(&self, execution_id: DbId) -> Result<u64, CoreError> {
        StepRepo::skip_unsettled(&self.pool, execution_id)
            .await
            .map_err(CoreError::infra)
    }

    async fn delete_step(&self, id: DbId) -> Result<(), CoreError> {
        StepRepo::delete(&self.pool, id)
            .await
            .map_err(CoreError::infra)
    }

    async fn list_enabled_cron_triggers(&self) -> Result<Vec<Trigger>, CoreError> {
        TriggerRepo::list_enabled_cron(&self.pool)
            .await
            .map_err(CoreError::infra)
    }

    async fn record_trigger_fired(
        &self,
        id: DbId,
        fired_at: Timestamp,
        next_run_at: Option<Timestamp>,
    ) -> Result<(), CoreError> {
        TriggerRepo::record_fired(&self.pool, id, fired_at, next_run_at)
            .await
            .map_err(CoreError::infra)
    }
}

// ---------------------------------------------------------------------------
// PgQueue
// ---------------------------------------------------------------------------

/// [`JobQueue`] backed by the `job_queue` table.
///
/// Claim exclusivity comes from the repository's
/// `FOR UPDATE SKIP LOCKED` dequeue; the notifier only provides
/// opportunistic low-latency pickup within this process, cross-process
/// consumers rely on the poll interval.
pub struct PgQueue {
    pool: DbPool,
    notify: Arc<Notify>,
}

impl PgQueue {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl JobQueue for PgQueue {
    async fn enqueue(&self, job: &WorkerJob, max_attempts: i32) -> Result<(), CoreError> {
        let payload = serde_json::to_value(job).map_err(CoreError::infra)?;
        QueueRepo::enqueue(
            &self.pool,
            job.id,
            job.execution_id,
            &job.node.id,
            &job.node.label,
            job.node.node_type.as_str(),
            &payload,
            max_attempts,
        )
        .await
        .map_err(CoreError::infra)?;
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<WorkerJob>, CoreError> {
        let row = QueueRepo::dequeue(&self.pool, worker_id)
            .await
            .map_err(CoreError::infra)?;
        match row {
            Some(row) => {
                let job: WorkerJob =
                    serde_json::from_value(row.payload).map_err(CoreError::infra)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn mark_done(&self, id: DbId, result: &Value) -> Result<(), CoreError> {
        QueueRepo::mark_done(&self.pool, id, result)
            .await
            .map_err(CoreError::infra)
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<(), CoreError> {
        QueueRepo::mark_failed(&self.pool, id, error)
            .await
            .map_err(CoreError::infra)
    }

    async fn depth(&self) -> Result<i64, CoreError> {
        QueueRepo::depth(&self.pool).await.map_err(CoreError::infra)
    }

    async fn stats(&self) -> Result<QueueStats, CoreError> {
        QueueRepo::stats(&self.pool).await.map_err(CoreError::infra)
    }

    async fn reclaim_stale(&self, older_than: Timestamp) -> Result<(u64, u64), CoreError> {
        let counts = QueueRepo::reclaim_stale(&self.pool, older_than)
            .await
            .map_err(CoreError::infra)?;
        if counts.0 > 0 {
            self.notify.notify_one();
        }
        Ok(counts)
    }

    fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}
