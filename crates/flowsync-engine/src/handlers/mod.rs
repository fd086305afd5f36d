//! Node handlers: one executable unit per node type.
//!
//! A handler receives a [`WorkerJob`] and always returns a [`WorkerResult`];
//! failures are encoded in the result, never raised. Handlers performing
//! external side effects must be idempotent whenever they report
//! `retryable = true`.

mod action;
mod basic;
mod condition;
mod delay;
mod join;
mod transform;
mod webhook_response;

pub use action::ActionHandler;
pub use basic::{EndHandler, ForkHandler, StartHandler};
pub use condition::ConditionHandler;
pub use delay::DelayHandler;
pub use join::JoinHandler;
pub use transform::TransformHandler;
pub use webhook_response::WebhookResponseHandler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use flowsync_core::dag::NodeType;

use crate::job::{WorkerJob, WorkerResult};

/// An executable unit for one node type.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn node_type(&self) -> NodeType;

    async fn execute(&self, job: &WorkerJob) -> WorkerResult;
}

/// Milliseconds elapsed since `start`, for result durations.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// String-keyed dispatch table from node type to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a registry with all nine built-in handlers registered.
    pub fn with_defaults(http_client: reqwest::Client, max_delay_ms: u64) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StartHandler));
        registry.register(Arc::new(EndHandler));
        registry.register(Arc::new(ForkHandler));
        registry.register(Arc::new(ActionHandler::new(http_client)));
        registry.register(Arc::new(ConditionHandler));
        registry.register(Arc::new(DelayHandler::new(max_delay_ms)));
        registry.register(Arc::new(JoinHandler));
        registry.register(Arc::new(TransformHandler));
        registry.register(Arc::new(WebhookResponseHandler));
        registry
    }

    /// Register a handler under its node type. Later registrations replace
    /// earlier ones.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers
            .insert(handler.node_type().as_str().to_string(), handler);
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }

    pub fn has(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Registered type names, sorted.
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use flowsync_core::retry::RetryPolicy;
    use serde_json::{json, Map, Value};

    use crate::job::WorkerJob;

    /// Build a job for handler tests.
    pub fn job_for(node_type: &str, config: Value) -> WorkerJob {
        WorkerJob {
            id: 1,
            execution_id: 1,
            node: serde_json::from_value(json!({
                "id": "node-under-test",
                "type": node_type,
                "label": "Node under test",
                "config": config,
            }))
            .unwrap(),
            input: json!({}),
            previous_results: Map::new(),
            predecessors: vec![],
            attempt: 1,
            max_retries: 0,
            retry: RetryPolicy::default(),
        }
    }
}
