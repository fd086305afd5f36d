//! Job publisher: materializes a step row and enqueues the job, guarded by
//! idempotency and backpressure admission.

use std::sync::Arc;

use serde_json::{Map, Value};

use flowsync_core::dag::Node;
use flowsync_core::error::CoreError;
use flowsync_core::retry::RetryPolicy;
use flowsync_core::types::DbId;

use crate::backpressure::BackpressureController;
use crate::idempotency::{IdempotencyCheck, IdempotencyStore};
use crate::job::WorkerJob;
use crate::metrics::EngineMetrics;
use crate::store::{EngineStore, JobQueue};

/// One publication: schedule `node` for `execution_id`.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub execution_id: DbId,
    pub node: Node,
    pub input: Value,
    pub previous_results: Map<String, Value>,
    /// Direct predecessor node ids (empty for initial nodes).
    pub predecessors: Vec<String>,
    /// 1-based attempt ordinal; 1 for fresh publications.
    pub attempt: u32,
}

impl PublishRequest {
    /// A first-attempt publication.
    pub fn new(
        execution_id: DbId,
        node: Node,
        input: Value,
        previous_results: Map<String, Value>,
        predecessors: Vec<String>,
    ) -> Self {
        Self {
            execution_id,
            node,
            input,
            previous_results,
            predecessors,
            attempt: 1,
        }
    }
}

/// Creates step rows and feeds the durable queue.
pub struct JobPublisher {
    store: Arc<dyn EngineStore>,
    queue: Arc<dyn JobQueue>,
    idempotency: Arc<IdempotencyStore>,
    backpressure: Arc<BackpressureController>,
    metrics: Arc<EngineMetrics>,
}

impl JobPublisher {
    pub fn new(
        store: Arc<dyn EngineStore>,
        queue: Arc<dyn JobQueue>,
        idempotency: Arc<IdempotencyStore>,
        backpressure: Arc<BackpressureController>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            queue,
            idempotency,
            backpressure,
            metrics,
        }
    }

    /// Publish one node job. Returns the step id owning the publication —
    /// the freshly created one, or the already-scheduled step's id when the
    /// idempotency key is live.
    ///
    /// Under `rejecting` backpressure the step row is created and left
    /// `pending` without a queue row; re-driving it is an operator action
    /// surfaced through the rejection counter and logs.
    pub async fn publish(&self, request: PublishRequest) -> Result<DbId, CoreError> {
        let retry = RetryPolicy::from_node_config(&request.node.config);

        let step = self
            .store
            .create_step(
                request.execution_id,
                &request.node.id,
                &request.node.label,
                request.node.node_type.as_str(),
                request.attempt as i32,
            )
            .await?;

        let key = IdempotencyStore::key(request.execution_id, &request.node.id);
        if let IdempotencyCheck::Duplicate { existing_step_id } =
            self.idempotency.check_and_set(&key, step.id)
        {
            self.store.delete_step(step.id).await?;
            tracing::debug!(
                execution_id = request.execution_id,
                node_id = %request.node.id,
                existing_step_id,
                "Duplicate publication suppressed"
            );
            return Ok(existing_step_id);
        }

        let depth = self.queue.depth().await?;
        self.backpressure.observe(depth);
        if !self.backpressure.can_accept() {
            self.metrics.publish_rejected();
            tracing::warn!(
                execution_id = request.execution_id,
                node_id = %request.node.id,
                depth,
                "Queue saturated; publication rejected, step left pending"
            );
            return Ok(step.id);
        }

        let job = WorkerJob {
            id: step.id,
            execution_id: request.execution_id,
            node: request.node,
            input: request.input,
            previous_results: request.previous_results,
            predecessors: request.predecessors,
            attempt: request.attempt,
            max_retries: retry.max_retries,
            retry,
        };

        self.queue.enqueue(&job, (retry.max_retries + 1) as i32).await?;
        self.metrics.job_published();
        Ok(step.id)
    }

    /// Sequentially publish a batch, returning the step ids in order.
    pub async fn publish_many(
        &self,
        requests: Vec<PublishRequest>,
    ) -> Result<Vec<DbId>, CoreError> {
        let mut step_ids = Vec::with_capacity(requests.len());
        for request in requests {
            step_ids.push(self.publish(request).await?);
        }
        Ok(step_ids)
    }
}
