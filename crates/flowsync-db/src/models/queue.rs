//! Durable job queue row model.

use flowsync_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `job_queue` table.
///
/// The row id equals the id of the step execution it carries; `payload`
/// holds the full worker job. Insertion-time order (`created_at`) is the
/// consumption order; `locked_at`/`locked_by` record the claiming worker.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueRow {
    pub id: DbId,
    pub execution_id: DbId,
    pub node_id: String,
    pub node_label: String,
    pub node_type: String,
    pub payload: serde_json::Value,
    pub status_id: i16,
    pub attempts: i32,
    pub max_attempts: i32,
    pub locked_at: Option<Timestamp>,
    pub locked_by: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

/// Aggregate queue counters surfaced by the stats endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    /// Live count of pending rows.
    pub depth: i64,
    pub total_enqueued: i64,
    pub total_processed: i64,
    pub total_failed: i64,
}
