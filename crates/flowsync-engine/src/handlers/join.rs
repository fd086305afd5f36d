//! Join handler: the barrier itself is enforced by the result handler's
//! readiness rule (a join is only published once every in-edge source has
//! settled); this handler merges the upstream results.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use flowsync_core::dag::NodeType;

use crate::job::{WorkerJob, WorkerResult};

use super::{elapsed_ms, NodeHandler};

pub struct JoinHandler;

#[async_trait]
impl NodeHandler for JoinHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Join
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();

        // Skipped predecessors have no recorded result and contribute
        // nothing to the merge; they satisfied the barrier by settling.
        let merged: Map<String, Value> = job
            .predecessors
            .iter()
            .filter_map(|node_id| {
                job.previous_results
                    .get(node_id)
                    .map(|result| (node_id.clone(), result.clone()))
            })
            .collect();

        WorkerResult::completed(job, json!({ "mergedResults": merged }), elapsed_ms(started))
    }
}
