//! Orchestrator: starts executions, seeds the initial wave, and awaits the
//! one-shot completion signal.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use flowsync_core::error::CoreError;
use flowsync_core::types::DbId;
use flowsync_db::models::WorkflowStatus;
use flowsync_events::{CompletionSignals, EngineEvent, EventBus, ExecutionOutcome};

use crate::metrics::EngineMetrics;
use crate::publisher::{JobPublisher, PublishRequest};
use crate::store::EngineStore;

/// What the caller of [`Orchestrator::execute_workflow`] gets back.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub execution_id: DbId,
    /// `"completed"`, `"failed"`, or `"cancelled"`.
    pub status: String,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ExecutionReport {
    fn from_outcome(execution_id: DbId, outcome: ExecutionOutcome) -> Self {
        Self {
            execution_id,
            status: outcome.status,
            output: outcome.output,
            error: outcome.error,
        }
    }
}

/// Drives whole executions from start to terminal state.
pub struct Orchestrator {
    store: Arc<dyn EngineStore>,
    publisher: Arc<JobPublisher>,
    signals: Arc<CompletionSignals>,
    bus: Arc<EventBus>,
    metrics: Arc<EngineMetrics>,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn EngineStore>,
        publisher: Arc<JobPublisher>,
        signals: Arc<CompletionSignals>,
        bus: Arc<EventBus>,
        metrics: Arc<EngineMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            signals,
            bus,
            metrics,
            timeout,
        }
    }

    /// Start an execution of an active workflow and await its terminal
    /// state.
    ///
    /// The await is bounded by the orchestrator deadline: on expiry the call
    /// reports failure, but in-flight steps are not rolled back and the
    /// execution may still reach a terminal state afterwards.
    pub async fn execute_workflow(
        &self,
        workflow_id: DbId,
        input: Value,
        triggered_by: Option<&str>,
    ) -> Result<ExecutionReport, CoreError> {
        let workflow = self
            .store
            .find_workflow(workflow_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            })?;

        if workflow.status_id != WorkflowStatus::Active.id() {
            return Err(CoreError::NotActive { workflow_id });
        }

        let def = workflow.parsed_definition().map_err(|e| {
            CoreError::Validation(format!("Stored workflow definition failed to parse: {e}"))
        })?;

        let execution = self
            .store
            .create_execution(workflow_id, &input, triggered_by)
            .await?;

        // Register before the first publish so a fast completion cannot be
        // lost between enqueue and await.
        let receiver = self.signals.register(execution.id);

        self.metrics.execution_started();
        self.bus.publish(
            EngineEvent::new("execution.started")
                .with_entity("execution", execution.id)
                .with_payload(json!({
                    "workflowId": workflow_id,
                    "triggeredBy": triggered_by,
                })),
        );
        tracing::info!(
            execution_id = execution.id,
            workflow_id,
            workflow = %workflow.name,
            "Execution started"
        );

        let initial = def.initial_nodes();
        if initial.is_empty() {
            // Nothing to run; the execution is vacuously complete.
            let output = Value::Object(Map::new());
            self.store.complete_execution(execution.id, &output).await?;
            self.signals.forget(execution.id);
            self.metrics.execution_completed();
            return Ok(ExecutionReport {
                execution_id: execution.id,
                status: "completed".to_string(),
                output: Some(output),
                error: None,
            });
        }

        for node in initial {
            self.publisher
                .publish(PublishRequest::new(
                    execution.id,
                    node.clone(),
                    input.clone(),
                    Map::new(),
                    Vec::new(),
                ))
                .await?;
        }

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(outcome)) => Ok(ExecutionReport::from_outcome(execution.id, outcome)),
            Ok(Err(_)) => Ok(ExecutionReport {
                execution_id: execution.id,
                status: "failed".to_string(),
                output: None,
                error: Some("Completion signal dropped".to_string()),
            }),
            Err(_) => {
                self.signals.forget(execution.id);
                tracing::warn!(
                    execution_id = execution.id,
                    timeout_secs = self.timeout.as_secs(),
                    "Execution await deadline expired"
                );
                Ok(ExecutionReport {
                    execution_id: execution.id,
                    status: "failed".to_string(),
                    output: None,
                    error: Some(format!(
                        "Execution timed out ({}s)",
                        self.timeout.as_secs()
                    )),
                })
            }
        }
    }

    /// Cancel an execution: terminal, sticky, and non-preemptive. In-flight
    /// handlers run to completion; the result handler refuses to advance a
    /// cancelled execution.
    pub async fn cancel_execution(&self, execution_id: DbId) -> Result<bool, CoreError> {
        let cancelled = self.store.cancel_execution(execution_id).await?;
        if cancelled {
            self.store.skip_unsettled_steps(execution_id).await?;
            self.metrics.execution_cancelled();
            self.bus.publish(
                EngineEvent::new("execution.cancelled").with_entity("execution", execution_id),
            );
            self.signals
                .complete(execution_id, ExecutionOutcome::cancelled());
            tracing::info!(execution_id, "Execution cancelled");
        }
        Ok(cancelled)
    }
}
