//! Webhook-response handler: assembles the body a webhook-triggered run
//! replies with, from selected node results or everything recorded so far.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use flowsync_core::dag::NodeType;

use crate::job::{WorkerJob, WorkerResult};

use super::{elapsed_ms, NodeHandler};

pub struct WebhookResponseHandler;

#[async_trait]
impl NodeHandler for WebhookResponseHandler {
    fn node_type(&self) -> NodeType {
        NodeType::WebhookResponse
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();
        let config = &job.node.config;

        let mut body: Map<String, Value> =
            match config.get("responseFields").and_then(|v| v.as_array()) {
                Some(fields) => fields
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|node_id| {
                        job.previous_results
                            .get(node_id)
                            .map(|result| (node_id.to_string(), result.clone()))
                    })
                    .collect(),
                None => job.previous_results.clone(),
            };

        if config
            .get("includeMetadata")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            body.insert(
                "_metadata".to_string(),
                json!({
                    "executionId": job.execution_id,
                    "nodeId": job.node.id,
                    "generatedAt": Utc::now().to_rfc3339(),
                }),
            );
        }

        WorkerResult::completed(job, Value::Object(body), elapsed_ms(started))
    }
}
