//! Immediate-completion handlers: start, end, and fork.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;

use flowsync_core::dag::NodeType;

use crate::job::{WorkerJob, WorkerResult};

use super::{elapsed_ms, NodeHandler};

/// Entry node: completes immediately, echoing the execution input.
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Start
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();
        WorkerResult::completed(
            job,
            json!({
                "message": "Workflow started",
                "input": job.input,
            }),
            elapsed_ms(started),
        )
    }
}

/// Terminal node: completes immediately, marking its lineage done.
pub struct EndHandler;

#[async_trait]
impl NodeHandler for EndHandler {
    fn node_type(&self) -> NodeType {
        NodeType::End
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();
        WorkerResult::completed(
            job,
            json!({ "message": "Workflow completed" }),
            elapsed_ms(started),
        )
    }
}

/// Fan-out node: completes immediately, passing the input through. The
/// outgoing edges carry the parallelism.
pub struct ForkHandler;

#[async_trait]
impl NodeHandler for ForkHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Fork
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();
        WorkerResult::completed(job, job.input.clone(), elapsed_ms(started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::job_for;
    use crate::job::ResultStatus;
    use serde_json::json;

    #[tokio::test]
    async fn start_echoes_the_input() {
        let mut job = job_for("start", json!({}));
        job.input = json!({"order": 42});

        let result = StartHandler.execute(&job).await;
        assert_eq!(result.status, ResultStatus::Completed);
        let value = result.result.unwrap();
        assert_eq!(value["input"]["order"], 42);
    }

    #[tokio::test]
    async fn end_completes_immediately() {
        let result = EndHandler.execute(&job_for("end", json!({}))).await;
        assert_eq!(result.status, ResultStatus::Completed);
    }

    #[tokio::test]
    async fn fork_passes_input_through() {
        let mut job = job_for("fork", json!({}));
        job.input = json!({"payload": [1, 2, 3]});

        let result = ForkHandler.execute(&job).await;
        assert_eq!(result.result.unwrap()["payload"], json!([1, 2, 3]));
    }
}
