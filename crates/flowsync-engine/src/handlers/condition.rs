//! Condition handler: evaluates a routing expression against the execution
//! input and previous step results. The boolean `result` field drives the
//! result handler's branch selection.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;

use flowsync_core::dag::NodeType;
use flowsync_core::expr;

use crate::job::{WorkerJob, WorkerResult};

use super::{elapsed_ms, NodeHandler};

pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();

        // A condition without an expression always takes the true branch.
        let expression = job
            .node
            .config
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or("true");

        let outcome = expr::evaluate_condition(expression, &job.input, &job.previous_results);

        WorkerResult::completed(
            job,
            json!({
                "result": outcome,
                "expression": expression,
            }),
            elapsed_ms(started),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::job_for;
    use serde_json::json;

    #[tokio::test]
    async fn literal_true_expression() {
        let job = job_for("condition", json!({"expression": "1"}));
        let result = ConditionHandler.execute(&job).await;
        assert_eq!(result.result.unwrap()["result"], true);
    }

    #[tokio::test]
    async fn compares_against_previous_results() {
        let mut job = job_for("condition", json!({"expression": "$check.status == 200"}));
        job.previous_results
            .insert("check".into(), json!({"status": 200}));

        let result = ConditionHandler.execute(&job).await;
        assert_eq!(result.result.unwrap()["result"], true);
    }

    #[tokio::test]
    async fn false_branch_on_unmet_comparison() {
        let mut job = job_for("condition", json!({"expression": "$check.status < 100"}));
        job.previous_results
            .insert("check".into(), json!({"status": 200}));

        let result = ConditionHandler.execute(&job).await;
        assert_eq!(result.result.unwrap()["result"], false);
    }

    #[tokio::test]
    async fn missing_expression_defaults_to_true() {
        let result = ConditionHandler.execute(&job_for("condition", json!({}))).await;
        let value = result.result.unwrap();
        assert_eq!(value["result"], true);
        assert_eq!(value["expression"], "true");
    }
}
