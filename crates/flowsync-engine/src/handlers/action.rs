//! Action handler: `http` requests via `reqwest`, plus deterministic
//! `email` and `default` simulations.
//!
//! Transport failures (connect, DNS, timeout) report `retryable = true`;
//! non-2xx responses are captured as a completed result with the status
//! code, leaving the routing decision to downstream condition nodes.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};

use flowsync_core::dag::NodeType;

use crate::job::{WorkerJob, WorkerResult};

use super::{elapsed_ms, NodeHandler};

pub struct ActionHandler {
    client: reqwest::Client,
}

impl ActionHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute_http(&self, job: &WorkerJob, started: Instant) -> WorkerResult {
        let config = &job.node.config;

        let url = match config.get("url").and_then(|v| v.as_str()) {
            Some(url) => url,
            None => {
                return WorkerResult::failed(
                    job,
                    "HTTP action requires a \"url\" in its config",
                    Some(false),
                    elapsed_ms(started),
                );
            }
        };

        let method = config
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            "PATCH" => self.client.patch(url),
            other => {
                return WorkerResult::failed(
                    job,
                    format!("Unsupported HTTP method: {other}"),
                    Some(false),
                    elapsed_ms(started),
                );
            }
        };

        if let Some(headers) = config.get("headers").and_then(|v| v.as_object()) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }

        if let Some(body) = config.get("body") {
            if matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
                request = request.json(body);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return WorkerResult::failed(
                    job,
                    format!("HTTP request failed: {e}"),
                    Some(true),
                    elapsed_ms(started),
                );
            }
        };

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return WorkerResult::failed(
                    job,
                    format!("Failed to read response body: {e}"),
                    Some(true),
                    elapsed_ms(started),
                );
            }
        };

        let body: Value = if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };

        WorkerResult::completed(
            job,
            json!({
                "status": status.as_u16(),
                "body": body,
                "success": status.is_success(),
            }),
            elapsed_ms(started),
        )
    }

    /// Deterministic email simulation; no mail is sent.
    fn execute_email(job: &WorkerJob, started: Instant) -> WorkerResult {
        let config = &job.node.config;
        WorkerResult::completed(
            job,
            json!({
                "sent": true,
                "simulated": true,
                "to": config.get("to").cloned().unwrap_or(Value::Null),
                "subject": config.get("subject").cloned().unwrap_or(Value::Null),
            }),
            elapsed_ms(started),
        )
    }

    fn execute_default(job: &WorkerJob, action_type: &str, started: Instant) -> WorkerResult {
        WorkerResult::completed(
            job,
            json!({
                "message": "Action executed",
                "actionType": action_type,
                "input": job.input,
            }),
            elapsed_ms(started),
        )
    }
}

#[async_trait]
impl NodeHandler for ActionHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Action
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();
        let action_type = job
            .node
            .config
            .get("actionType")
            .and_then(|v| v.as_str())
            .unwrap_or("default");

        match action_type {
            "http" => self.execute_http(job, started).await,
            "email" => Self::execute_email(job, started),
            other => Self::execute_default(job, other, started),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::job_for;
    use crate::job::ResultStatus;
    use serde_json::json;

    fn handler() -> ActionHandler {
        ActionHandler::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn default_action_is_deterministic() {
        let mut job = job_for("action", json!({}));
        job.input = json!({"k": "v"});

        let result = handler().execute(&job).await;
        assert_eq!(result.status, ResultStatus::Completed);
        let value = result.result.unwrap();
        assert_eq!(value["actionType"], "default");
        assert_eq!(value["input"]["k"], "v");
    }

    #[tokio::test]
    async fn email_action_simulates_without_sending() {
        let job = job_for(
            "action",
            json!({"actionType": "email", "to": "ops@example.com", "subject": "hi"}),
        );

        let result = handler().execute(&job).await;
        let value = result.result.unwrap();
        assert_eq!(value["sent"], true);
        assert_eq!(value["simulated"], true);
        assert_eq!(value["to"], "ops@example.com");
    }

    #[tokio::test]
    async fn http_without_url_fails_non_retryable() {
        let job = job_for("action", json!({"actionType": "http"}));
        let result = handler().execute(&job).await;
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.retryable, Some(false));
    }

    #[tokio::test]
    async fn http_with_bad_method_fails_non_retryable() {
        let job = job_for(
            "action",
            json!({"actionType": "http", "url": "http://localhost:1/x", "method": "BREW"}),
        );
        let result = handler().execute(&job).await;
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.retryable, Some(false));
    }

    #[tokio::test]
    async fn transport_failure_is_retryable() {
        // Nothing listens on this port; the connect error must surface as a
        // retryable failure, not a panic or an Err.
        let job = job_for(
            "action",
            json!({"actionType": "http", "url": "http://127.0.0.1:1/unreachable"}),
        );
        let result = handler().execute(&job).await;
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.retryable, Some(true));
        assert!(result.error.unwrap().contains("HTTP request failed"));
    }
}
