//! In-memory storage backend.
//!
//! Mirrors the PostgreSQL semantics — FIFO by insertion order, exclusive
//! dequeue claims, sticky terminal states — behind plain mutex-guarded maps.
//! Used by the engine test-suite and for local development without a
//! database. Critical sections are short map mutations; no lock is held
//! across an await point.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Notify;

use flowsync_core::error::CoreError;
use flowsync_core::types::{DbId, Timestamp};
use flowsync_db::models::{
    trigger_types, Execution, ExecutionStatus, QueueStats, QueueStatus, StepExecution,
    StepStatus, Trigger, Workflow, WorkflowStatus,
};

use crate::job::WorkerJob;
use crate::store::{EngineStore, JobQueue};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    next_id: DbId,
    workflows: HashMap<DbId, Workflow>,
    executions: HashMap<DbId, Execution>,
    steps: HashMap<DbId, StepExecution>,
    step_order: Vec<DbId>,
    triggers: HashMap<DbId, Trigger>,
}

impl StoreState {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded in-memory implementation of [`EngineStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a workflow snapshot directly (test/dev seeding).
    pub fn seed_workflow(
        &self,
        name: &str,
        definition: Value,
        status: WorkflowStatus,
    ) -> Workflow {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let id = state.next_id();
        let now = Utc::now();
        let workflow = Workflow {
            id,
            name: name.to_string(),
            version: 1,
            status_id: status.id(),
            definition,
            created_at: now,
            updated_at: now,
        };
        state.workflows.insert(id, workflow.clone());
        workflow
    }

    /// Insert a cron trigger directly (test/dev seeding).
    pub fn seed_cron_trigger(&self, workflow_id: DbId, config: Value, enabled: bool) -> Trigger {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let id = state.next_id();
        let now = Utc::now();
        let trigger = Trigger {
            id,
            workflow_id,
            trigger_type: trigger_types::CRON.to_string(),
            config,
            enabled,
            last_fired_at: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        };
        state.triggers.insert(id, trigger.clone());
        trigger
    }

    /// Latest `last_fired_at` of a trigger (test inspection).
    pub fn trigger_last_fired(&self, id: DbId) -> Option<Timestamp> {
        self.state
            .lock()
            .expect("memory store lock poisoned")
            .triggers
            .get(&id)
            .and_then(|t| t.last_fired_at)
    }
}

#[async_trait]
impl EngineStore for MemoryStore {
    async fn find_workflow(&self, id: DbId) -> Result<Option<Workflow>, CoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state.workflows.get(&id).cloned())
    }

    async fn create_execution(
        &self,
        workflow_id: DbId,
        input: &Value,
        triggered_by: Option<&str>,
    ) -> Result<Execution, CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let id = state.next_id();
        let now = Utc::now();
        let execution = Execution {
            id,
            workflow_id,
            status_id: ExecutionStatus::Running.id(),
            input: input.clone(),
            output: None,
            error: None,
            triggered_by: triggered_by.map(str::to_string),
            started_at: Some(now),
            completed_at: None,
            created_at: now,
        };
        state.executions.insert(id, execution.clone());
        Ok(execution)
    }

    async fn find_execution(&self, id: DbId) -> Result<Option<Execution>, CoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state.executions.get(&id).cloned())
    }

    async fn complete_execution(&self, id: DbId, output: &Value) -> Result<bool, CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        match state.executions.get_mut(&id) {
            Some(e) if e.status_id == ExecutionStatus::Running.id() => {
                e.status_id = ExecutionStatus::Completed.id();
                e.output = Some(output.clone());
                e.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_execution(&self, id: DbId, error: &str) -> Result<bool, CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        match state.executions.get_mut(&id) {
            Some(e) if e.status_id == ExecutionStatus::Running.id() => {
                e.status_id = ExecutionStatus::Failed.id();
                e.error = Some(error.to_string());
                e.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_execution(&self, id: DbId) -> Result<bool, CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        match state.executions.get_mut(&id) {
            Some(e)
                if e.status_id == ExecutionStatus::Running.id()
                    || e.status_id == ExecutionStatus::Pending.id() =>
            {
                e.status_id = ExecutionStatus::Cancelled.id();
                e.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_step(
        &self,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
        attempts: i32,
    ) -> Result<StepExecution, CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let id = state.next_id();
        let now = Utc::now();
        let step = StepExecution {
            id,
            execution_id,
            node_id: node_id.to_string(),
            node_label: node_label.to_string(),
            node_type: node_type.to_string(),
            status_id: StepStatus::Pending.id(),
            attempts,
            result: None,
            error: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
        };
        state.steps.insert(id, step.clone());
        state.step_order.push(id);
        Ok(step)
    }

    async fn create_skipped_step(
        &self,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
    ) -> Result<StepExecution, CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let id = state.next_id();
        let now = Utc::now();
        let step = StepExecution {
            id,
            execution_id,
            node_id: node_id.to_string(),
            node_label: node_label.to_string(),
            node_type: node_type.to_string(),
            status_id: StepStatus::Skipped.id(),
            attempts: 0,
            result: None,
            error: None,
            started_at: None,
            completed_at: Some(now),
            created_at: now,
        };
        state.steps.insert(id, step.clone());
        state.step_order.push(id);
        Ok(step)
    }

    async fn find_step(&self, id: DbId) -> Result<Option<StepExecution>, CoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state.steps.get(&id).cloned())
    }

    async fn list_steps(&self, execution_id: DbId) -> Result<Vec<StepExecution>, CoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state
            .step_order
            .iter()
            .filter_map(|id| state.steps.get(id))
            .filter(|s| s.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn mark_step_running(&self, id: DbId, attempts: i32) -> Result<bool, CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        match state.steps.get_mut(&id) {
            Some(s) if s.status_id == StepStatus::Pending.id() => {
                s.status_id = StepStatus::Running.id();
                s.attempts = attempts;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_step(&self, id: DbId, result: &Value) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        if let Some(s) = state.steps.get_mut(&id) {
            s.status_id = StepStatus::Completed.id();
            s.result = Some(result.clone());
            s.error = None;
            s.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_step(&self, id: DbId, error: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        if let Some(s) = state.steps.get_mut(&id) {
            s.status_id = StepStatus::Failed.id();
            s.error = Some(error.to_string());
            s.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn reset_step_for_retry(
        &self,
        id: DbId,
        error: &str,
        attempts: i32,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        if let Some(s) = state.steps.get_mut(&id) {
            s.status_id = StepStatus::Pending.id();
            s.error = Some(error.to_string());
            s.attempts = attempts;
        }
        Ok(())
    }

    async fn skip_unsettled_steps(&self, execution_id: DbId) -> Result<u64, CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let now = Utc::now();
        let mut swept = 0;
        for step in state.steps.values_mut() {
            if step.execution_id == execution_id
                && (step.status_id == StepStatus::Pending.id()
                    || step.status_id == StepStatus::Running.id())
            {
                step.status_id = StepStatus::Skipped.id();
                step.completed_at = Some(now);
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn delete_step(&self, id: DbId) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        state.steps.remove(&id);
        state.step_order.retain(|sid| *sid != id);
        Ok(())
    }

    async fn list_enabled_cron_triggers(&self) -> Result<Vec<Trigger>, CoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        let mut triggers: Vec<Trigger> = state
            .triggers
            .values()
            .filter(|t| t.enabled && t.trigger_type == trigger_types::CRON)
            .cloned()
            .collect();
        triggers.sort_by_key(|t| t.id);
        Ok(triggers)
    }

    async fn record_trigger_fired(
        &self,
        id: DbId,
        fired_at: Timestamp,
        next_run_at: Option<Timestamp>,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        if let Some(t) = state.triggers.get_mut(&id) {
            t.last_fired_at = Some(fired_at);
            t.next_run_at = next_run_at;
            t.updated_at = Utc::now();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryQueue
// ---------------------------------------------------------------------------

struct QueueRowState {
    job: WorkerJob,
    status: QueueStatus,
    attempts: i32,
    max_attempts: i32,
    locked_at: Option<Timestamp>,
    locked_by: Option<String>,
}

#[derive(Default)]
struct QueueState {
    rows: HashMap<DbId, QueueRowState>,
    fifo: VecDeque<DbId>,
    total_enqueued: i64,
    total_processed: i64,
    total_failed: i64,
}

/// Mutex-guarded in-memory implementation of [`JobQueue`].
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &WorkerJob, max_attempts: i32) -> Result<(), CoreError> {
        {
            let mut state = self.state.lock().expect("memory queue lock poisoned");
            // Re-enqueues reuse the step id and re-enter the FIFO at the back.
            state.fifo.retain(|id| *id != job.id);
            let attempts = state.rows.get(&job.id).map(|r| r.attempts).unwrap_or(0);
            state.rows.insert(
                job.id,
                QueueRowState {
                    job: job.clone(),
                    status: QueueStatus::Pending,
                    attempts,
                    max_attempts,
                    locked_at: None,
                    locked_by: None,
                },
            );
            state.fifo.push_back(job.id);
            state.total_enqueued += 1;
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<WorkerJob>, CoreError> {
        let mut state = self.state.lock().expect("memory queue lock poisoned");
        while let Some(id) = state.fifo.pop_front() {
            if let Some(row) = state.rows.get_mut(&id) {
                if row.status == QueueStatus::Pending {
                    row.status = QueueStatus::Processing;
                    row.attempts += 1;
                    row.locked_at = Some(Utc::now());
                    row.locked_by = Some(worker_id.to_string());
                    return Ok(Some(row.job.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn mark_done(&self, id: DbId, _result: &Value) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("memory queue lock poisoned");
        if let Some(row) = state.rows.get_mut(&id) {
            row.status = QueueStatus::Done;
            row.locked_at = None;
            row.locked_by = None;
        }
        state.total_processed += 1;
        Ok(())
    }

    async fn mark_failed(&self, id: DbId, _error: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("memory queue lock poisoned");
        if let Some(row) = state.rows.get_mut(&id) {
            row.status = QueueStatus::Failed;
            row.locked_at = None;
            row.locked_by = None;
        }
        state.total_failed += 1;
        Ok(())
    }

    async fn depth(&self) -> Result<i64, CoreError> {
        let state = self.state.lock().expect("memory queue lock poisoned");
        Ok(state
            .rows
            .values()
            .filter(|r| r.status == QueueStatus::Pending)
            .count() as i64)
    }

    async fn stats(&self) -> Result<QueueStats, CoreError> {
        let state = self.state.lock().expect("memory queue lock poisoned");
        Ok(QueueStats {
            depth: state
                .rows
                .values()
                .filter(|r| r.status == QueueStatus::Pending)
                .count() as i64,
            total_enqueued: state.total_enqueued,
            total_processed: state.total_processed,
            total_failed: state.total_failed,
        })
    }

    async fn reclaim_stale(&self, older_than: Timestamp) -> Result<(u64, u64), CoreError> {
        let mut reclaimed = 0;
        let mut failed = 0;
        {
            let mut state = self.state.lock().expect("memory queue lock poisoned");
            let stale: Vec<DbId> = state
                .rows
                .iter()
                .filter(|(_, r)| {
                    r.status == QueueStatus::Processing
                        && r.locked_at.map(|t| t < older_than).unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect();

            for id in stale {
                let exhausted = {
                    let row = state.rows.get_mut(&id).expect("row id just listed");
                    row.locked_at = None;
                    row.locked_by = None;
                    if row.attempts >= row.max_attempts {
                        row.status = QueueStatus::Failed;
                        true
                    } else {
                        row.status = QueueStatus::Pending;
                        false
                    }
                };
                if exhausted {
                    state.total_failed += 1;
                    failed += 1;
                } else {
                    state.fifo.push_back(id);
                    reclaimed += 1;
                }
            }
        }
        if reclaimed > 0 {
            self.notify.notify_one();
        }
        Ok((reclaimed, failed))
    }

    fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}
