//! Transform handler: reshapes data flowing between nodes.
//!
//! Stages apply in a fixed order: `mappings` (token or template per output
//! key), `pick` (copy keys from the input), `rename` (key moves on the
//! output), `template` (rendered string under `"rendered"`).

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use flowsync_core::dag::NodeType;
use flowsync_core::expr;

use crate::job::{WorkerJob, WorkerResult};

use super::{elapsed_ms, NodeHandler};

pub struct TransformHandler;

impl TransformHandler {
    /// Resolve one mapping value: `$`-refs resolve against input/results,
    /// strings with `{{...}}` interpolate, everything else copies verbatim.
    fn resolve_mapping(
        value: &Value,
        input: &Value,
        results: &Map<String, Value>,
    ) -> Value {
        match value {
            Value::String(s) if s.contains("{{") => {
                Value::String(expr::interpolate(s, input, results))
            }
            Value::String(s) if s.starts_with('$') => {
                expr::resolve_token(s, input, results).unwrap_or(Value::Null)
            }
            other => other.clone(),
        }
    }
}

#[async_trait]
impl NodeHandler for TransformHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Transform
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();
        let config = &job.node.config;
        let mut out = Map::new();

        if let Some(mappings) = config.get("mappings").and_then(|v| v.as_object()) {
            for (key, value) in mappings {
                out.insert(
                    key.clone(),
                    Self::resolve_mapping(value, &job.input, &job.previous_results),
                );
            }
        }

        if let Some(pick) = config.get("pick").and_then(|v| v.as_array()) {
            for key in pick.iter().filter_map(|v| v.as_str()) {
                if let Some(value) = job.input.get(key) {
                    out.insert(key.to_string(), value.clone());
                }
            }
        }

        if let Some(rename) = config.get("rename").and_then(|v| v.as_object()) {
            for (from, to) in rename {
                if let Some(to) = to.as_str() {
                    if let Some(value) = out.remove(from) {
                        out.insert(to.to_string(), value);
                    }
                }
            }
        }

        if let Some(template) = config.get("template").and_then(|v| v.as_str()) {
            out.insert(
                "rendered".to_string(),
                Value::String(expr::interpolate(template, &job.input, &job.previous_results)),
            );
        }

        WorkerResult::completed(job, Value::Object(out), elapsed_ms(started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::job_for;
    use serde_json::json;

    #[tokio::test]
    async fn mappings_resolve_refs_and_copy_constants() {
        let mut job = job_for(
            "transform",
            json!({"mappings": {
                "status": "$fetch.status",
                "label": "fixed-value",
                "count": 3
            }}),
        );
        job.previous_results
            .insert("fetch".into(), json!({"status": 200}));

        let result = TransformHandler.execute(&job).await.result.unwrap();
        assert_eq!(result["status"], 200);
        assert_eq!(result["label"], "fixed-value");
        assert_eq!(result["count"], 3);
    }

    #[tokio::test]
    async fn pick_copies_keys_from_input() {
        let mut job = job_for("transform", json!({"pick": ["name", "missing"]}));
        job.input = json!({"name": "ada", "other": 1});

        let result = TransformHandler.execute(&job).await.result.unwrap();
        assert_eq!(result["name"], "ada");
        assert!(result.get("missing").is_none());
        assert!(result.get("other").is_none());
    }

    #[tokio::test]
    async fn rename_moves_keys_after_pick() {
        let mut job = job_for(
            "transform",
            json!({"pick": ["name"], "rename": {"name": "user"}}),
        );
        job.input = json!({"name": "ada"});

        let result = TransformHandler.execute(&job).await.result.unwrap();
        assert_eq!(result["user"], "ada");
        assert!(result.get("name").is_none());
    }

    #[tokio::test]
    async fn template_renders_last() {
        let mut job = job_for(
            "transform",
            json!({"template": "hello {{$input.name}}, status {{$fetch.status}}"}),
        );
        job.input = json!({"name": "ada"});
        job.previous_results
            .insert("fetch".into(), json!({"status": 200}));

        let result = TransformHandler.execute(&job).await.result.unwrap();
        assert_eq!(result["rendered"], "hello ada, status 200");
    }

    #[tokio::test]
    async fn unresolvable_mapping_becomes_null() {
        let job = job_for("transform", json!({"mappings": {"gone": "$missing.path"}}));
        let result = TransformHandler.execute(&job).await.result.unwrap();
        assert_eq!(result["gone"], Value::Null);
    }

    #[tokio::test]
    async fn empty_config_yields_empty_object() {
        let result = TransformHandler
            .execute(&job_for("transform", json!({})))
            .await
            .result
            .unwrap();
        assert_eq!(result, json!({}));
    }
}
