//! Delay handler: sleeps for a configured duration or until an absolute
//! timestamp, bounded by the engine-wide delay cap.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use flowsync_core::dag::NodeType;

use crate::job::{WorkerJob, WorkerResult};

use super::{elapsed_ms, NodeHandler};

pub struct DelayHandler {
    max_delay_ms: u64,
}

impl DelayHandler {
    pub fn new(max_delay_ms: u64) -> Self {
        Self { max_delay_ms }
    }

    /// Resolve the configured wait, clamped to `[0, max_delay_ms]`.
    fn resolve_delay_ms(&self, job: &WorkerJob) -> Result<u64, String> {
        let config = &job.node.config;

        if let Some(scheduled) = config.get("scheduledTime") {
            let raw = scheduled
                .as_str()
                .ok_or_else(|| "\"scheduledTime\" must be an RFC 3339 string".to_string())?;
            let target: DateTime<Utc> = raw
                .parse()
                .map_err(|e| format!("Invalid \"scheduledTime\" ({raw}): {e}"))?;
            let remaining = (target - Utc::now()).num_milliseconds().max(0) as u64;
            return Ok(remaining.min(self.max_delay_ms));
        }

        let delay_ms = config.get("delayMs").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(delay_ms.min(self.max_delay_ms))
    }
}

#[async_trait]
impl NodeHandler for DelayHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Delay
    }

    async fn execute(&self, job: &WorkerJob) -> WorkerResult {
        let started = Instant::now();

        let delay_ms = match self.resolve_delay_ms(job) {
            Ok(ms) => ms,
            Err(message) => {
                return WorkerResult::failed(job, message, Some(false), elapsed_ms(started));
            }
        };

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        WorkerResult::completed(job, json!({ "delayedMs": delay_ms }), elapsed_ms(started))
    }
}
