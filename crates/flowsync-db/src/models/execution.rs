//! Execution entity model.

use flowsync_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `executions` table.
///
/// Created in `running` status; becomes `completed` when every reachable
/// node is terminal, `failed` on a terminally failed step, or `cancelled`
/// by external request. Terminal states stick.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Execution {
    pub id: DbId,
    pub workflow_id: DbId,
    pub status_id: i16,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub triggered_by: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
