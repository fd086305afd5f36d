//! Step execution entity model.

use flowsync_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// One scheduled instance of a node within an execution.
///
/// Transitions `pending -> running -> completed|failed`, or to `skipped`
/// when a condition deactivates its branch or the execution is cancelled.
/// `attempts` is the 1-based ordinal of the current attempt.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StepExecution {
    pub id: DbId,
    pub execution_id: DbId,
    pub node_id: String,
    pub node_label: String,
    pub node_type: String,
    pub status_id: i16,
    pub attempts: i32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
