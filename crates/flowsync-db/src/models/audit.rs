//! Audit log entity model. Append-only; rows never affect control flow.

use flowsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single audit log entry. Immutable once created (no updated_at).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub event: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<DbId>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for inserting a new audit log entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuditLog {
    pub event: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<DbId>,
    pub metadata: serde_json::Value,
}
