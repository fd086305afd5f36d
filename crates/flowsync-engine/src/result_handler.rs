//! Result handler: settles step outcomes and re-plans the DAG.
//!
//! On a terminal step failure the whole execution fails and its remaining
//! steps are swept to `skipped`. On success the handler filters condition
//! branches, creates `skipped` rows down deactivated branches (stopping at
//! joins, which observe the skip through their in-edge accounting),
//! recomputes the ready set, publishes the next wave, and completes the
//! execution once nothing is runnable or in flight.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use flowsync_core::dag::{ConditionBranch, NodeType, WorkflowDefinition};
use flowsync_core::error::CoreError;
use flowsync_core::types::DbId;
use flowsync_db::models::{ExecutionStatus, StepExecution, StepStatus};
use flowsync_events::{CompletionSignals, EngineEvent, EventBus, ExecutionOutcome};

use crate::job::{ResultStatus, WorkerResult};
use crate::metrics::EngineMetrics;
use crate::publisher::{JobPublisher, PublishRequest};
use crate::store::EngineStore;

/// Advances executions as worker results arrive.
pub struct ResultHandler {
    store: Arc<dyn EngineStore>,
    publisher: Arc<JobPublisher>,
    signals: Arc<CompletionSignals>,
    bus: Arc<EventBus>,
    metrics: Arc<EngineMetrics>,
}

impl ResultHandler {
    pub fn new(
        store: Arc<dyn EngineStore>,
        publisher: Arc<JobPublisher>,
        signals: Arc<CompletionSignals>,
        bus: Arc<EventBus>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            publisher,
            signals,
            bus,
            metrics,
        }
    }

    /// Record a final worker result and advance the owning execution.
    pub async fn handle(&self, result: WorkerResult) -> Result<(), CoreError> {
        let step = match self.store.find_step(result.step_id).await? {
            Some(step) => step,
            None => {
                tracing::warn!(step_id = result.step_id, "Result for unknown step dropped");
                return Ok(());
            }
        };

        match result.status {
            ResultStatus::Completed => {
                self.store
                    .complete_step(step.id, result.result.as_ref().unwrap_or(&Value::Null))
                    .await?;
            }
            ResultStatus::Failed => {
                self.store
                    .fail_step(step.id, result.error.as_deref().unwrap_or("unknown error"))
                    .await?;
            }
        }
        self.metrics.step_settled(&step.node_type);

        let execution = match self.store.find_execution(result.execution_id).await? {
            Some(execution) => execution,
            None => {
                tracing::warn!(
                    execution_id = result.execution_id,
                    "Result for unknown execution dropped"
                );
                return Ok(());
            }
        };

        // Cancellation does not preempt handlers; a result for a no-longer
        // running execution is recorded but must not advance the DAG.
        if execution.status_id != ExecutionStatus::Running.id() {
            tracing::debug!(
                execution_id = execution.id,
                step_id = step.id,
                "Execution no longer running; step recorded without advancing"
            );
            return Ok(());
        }

        if result.status == ResultStatus::Failed {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| format!("Step {} failed", step.node_label));
            self.store.fail_execution(execution.id, &error).await?;
            self.store.skip_unsettled_steps(execution.id).await?;
            self.metrics.execution_failed();
            self.bus.publish(
                EngineEvent::new("execution.failed")
                    .with_entity("execution", execution.id)
                    .with_payload(json!({ "nodeId": step.node_id, "error": error })),
            );
            self.signals
                .complete(execution.id, ExecutionOutcome::failed(error));
            return Ok(());
        }

        // -- Success: re-plan the DAG ---------------------------------------

        let workflow = self
            .store
            .find_workflow(execution.workflow_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "workflow",
                id: execution.workflow_id,
            })?;
        let def = workflow.parsed_definition().map_err(|e| {
            CoreError::Validation(format!("Stored workflow definition failed to parse: {e}"))
        })?;

        let steps = self.store.list_steps(execution.id).await?;
        let mut have_rows: HashSet<String> = steps.iter().map(|s| s.node_id.clone()).collect();

        // Deactivated condition branches become skipped step rows.
        for edge_target in self.rejected_targets(&def, &step, &result) {
            self.skip_branch(&def, execution.id, &edge_target, &mut have_rows)
                .await?;
        }

        let steps = self.store.list_steps(execution.id).await?;
        let previous_results = collect_results(&steps);
        let latest = latest_status_by_node(&steps);

        let settled = |node_id: &str| {
            latest
                .get(node_id)
                .and_then(|id| StepStatus::from_id(*id))
                .map(StepStatus::is_settled)
                .unwrap_or(false)
        };

        // A node is ready when it has in-edges, no step row yet, and every
        // in-edge source has settled. The same rule is the join barrier.
        let mut published_any = false;
        for node in &def.nodes {
            if latest.contains_key(node.id.as_str()) {
                continue;
            }
            let incoming = def.incoming(&node.id);
            if incoming.is_empty() || !incoming.iter().all(|e| settled(&e.source)) {
                continue;
            }

            let predecessors = incoming.iter().map(|e| e.source.clone()).collect();
            self.publisher
                .publish(PublishRequest::new(
                    execution.id,
                    node.clone(),
                    execution.input.clone(),
                    previous_results.clone(),
                    predecessors,
                ))
                .await?;
            published_any = true;
        }

        if !published_any {
            let in_flight = steps.iter().any(|s| {
                s.status_id == StepStatus::Pending.id() || s.status_id == StepStatus::Running.id()
            });
            if !in_flight {
                self.complete_execution(execution.id, previous_results).await?;
            }
        }

        Ok(())
    }

    /// Targets of outgoing edges deactivated by a condition outcome.
    ///
    /// Only condition nodes filter: edges matching the taken branch or
    /// carrying no label stay active, so unlabeled legacy definitions follow
    /// every edge.
    fn rejected_targets(
        &self,
        def: &WorkflowDefinition,
        step: &StepExecution,
        result: &WorkerResult,
    ) -> Vec<String> {
        if step.node_type != NodeType::Condition.as_str() {
            return Vec::new();
        }

        let outcome = result
            .result
            .as_ref()
            .and_then(|v| v.get("result"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let taken = ConditionBranch::from_outcome(outcome);

        def.outgoing(&step.node_id)
            .into_iter()
            .filter(|e| e.condition_branch.map(|b| b != taken).unwrap_or(false))
            .map(|e| e.target.clone())
            .collect()
    }

    /// Create `skipped` rows down a deactivated branch.
    ///
    /// Stops at join nodes (they still observe the skip via their in-edge
    /// accounting) and at nodes that already have a step row.
    async fn skip_branch(
        &self,
        def: &WorkflowDefinition,
        execution_id: DbId,
        start: &str,
        have_rows: &mut HashSet<String>,
    ) -> Result<(), CoreError> {
        let mut stack = vec![start.to_string()];
        while let Some(node_id) = stack.pop() {
            if have_rows.contains(&node_id) {
                continue;
            }
            let node = match def.node(&node_id) {
                Some(node) => node,
                None => continue,
            };
            if node.node_type == NodeType::Join {
                continue;
            }

            self.store
                .create_skipped_step(execution_id, &node.id, &node.label, node.node_type.as_str())
                .await?;
            have_rows.insert(node_id.clone());

            for edge in def.outgoing(&node_id) {
                stack.push(edge.target.clone());
            }
        }
        Ok(())
    }

    async fn complete_execution(
        &self,
        execution_id: DbId,
        previous_results: Map<String, Value>,
    ) -> Result<(), CoreError> {
        let output = Value::Object(previous_results);
        if self.store.complete_execution(execution_id, &output).await? {
            self.metrics.execution_completed();
            self.bus.publish(
                EngineEvent::new("execution.completed").with_entity("execution", execution_id),
            );
            self.signals
                .complete(execution_id, ExecutionOutcome::completed(output));
            tracing::info!(execution_id, "Execution completed");
        }
        Ok(())
    }
}

/// `node_id -> result` for completed steps; later rows win.
fn collect_results(steps: &[StepExecution]) -> Map<String, Value> {
    let mut results = Map::new();
    for step in steps {
        if step.status_id == StepStatus::Completed.id() {
            if let Some(result) = &step.result {
                results.insert(step.node_id.clone(), result.clone());
            }
        }
    }
    results
}

/// Latest step status per node; steps are ordered by creation, so later
/// rows overwrite earlier attempts.
fn latest_status_by_node(steps: &[StepExecution]) -> HashMap<String, i16> {
    let mut latest = HashMap::new();
    for step in steps {
        latest.insert(step.node_id.clone(), step.status_id);
    }
    latest
}
