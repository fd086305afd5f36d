//! Worker job and result types: the contract between the queue, the
//! handlers, and the result handler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flowsync_core::dag::Node;
use flowsync_core::retry::RetryPolicy;
use flowsync_core::types::DbId;

/// The payload carried by a queue row: everything a worker needs to run one
/// node attempt. `id` equals the step execution id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerJob {
    pub id: DbId,
    pub execution_id: DbId,
    pub node: Node,
    /// The execution's input document.
    pub input: Value,
    /// `node_id -> result` for every node completed so far.
    pub previous_results: Map<String, Value>,
    /// Node ids of the job node's direct predecessors in the DAG.
    #[serde(default)]
    pub predecessors: Vec<String>,
    /// 1-based attempt ordinal.
    pub attempt: u32,
    pub max_retries: u32,
    pub retry: RetryPolicy,
}

impl WorkerJob {
    /// The idempotency key scoping publication of this job's node.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.execution_id, self.node.id)
    }
}

/// Terminal status of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Completed,
    Failed,
}

/// Outcome of executing a [`WorkerJob`].
///
/// Handler failures never escape as errors; they are encoded here. When
/// `retryable` is `Some(false)` the consumer will not retry regardless of
/// the node's retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub job_id: DbId,
    pub step_id: DbId,
    pub execution_id: DbId,
    pub status: ResultStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub retryable: Option<bool>,
}

impl WorkerResult {
    /// A successful outcome with a result payload.
    pub fn completed(job: &WorkerJob, result: Value, duration_ms: u64) -> Self {
        Self {
            job_id: job.id,
            step_id: job.id,
            execution_id: job.execution_id,
            status: ResultStatus::Completed,
            result: Some(result),
            error: None,
            duration_ms,
            retryable: None,
        }
    }

    /// A failed outcome.
    pub fn failed(
        job: &WorkerJob,
        error: impl Into<String>,
        retryable: Option<bool>,
        duration_ms: u64,
    ) -> Self {
        Self {
            job_id: job.id,
            step_id: job.id,
            execution_id: job.execution_id,
            status: ResultStatus::Failed,
            result: None,
            error: Some(error.into()),
            duration_ms,
            retryable,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ResultStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node() -> Node {
        serde_json::from_value(json!({
            "id": "n1", "type": "action", "label": "N1", "config": {}
        }))
        .unwrap()
    }

    #[test]
    fn idempotency_key_is_execution_and_node_scoped() {
        let job = WorkerJob {
            id: 10,
            execution_id: 7,
            node: node(),
            input: json!({}),
            previous_results: Map::new(),
            predecessors: vec![],
            attempt: 1,
            max_retries: 0,
            retry: RetryPolicy::default(),
        };
        assert_eq!(job.idempotency_key(), "7:n1");
    }

    #[test]
    fn job_round_trips_through_queue_payload() {
        let job = WorkerJob {
            id: 10,
            execution_id: 7,
            node: node(),
            input: json!({"k": 1}),
            previous_results: Map::new(),
            predecessors: vec!["p".into()],
            attempt: 2,
            max_retries: 3,
            retry: RetryPolicy::default(),
        };
        let payload = serde_json::to_value(&job).unwrap();
        let back: WorkerJob = serde_json::from_value(payload).unwrap();
        assert_eq!(back.id, 10);
        assert_eq!(back.attempt, 2);
        assert_eq!(back.predecessors, vec!["p".to_string()]);
        assert_eq!(back.node.id, "n1");
    }
}
