//! Repository for the `audit_logs` table: append-only, fire-and-forget.

use sqlx::PgPool;

use crate::models::audit::{AuditLog, CreateAuditLog};

/// Column list for `audit_logs` queries.
const COLUMNS: &str = "id, event, entity_type, entity_id, metadata, created_at";

/// Provides insert and query operations for the audit trail.
pub struct AuditRepo;

impl AuditRepo {
    /// Append a single audit log entry.
    pub async fn insert(pool: &PgPool, entry: &CreateAuditLog) -> Result<AuditLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_logs (event, entity_type, entity_id, metadata) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(&entry.event)
            .bind(&entry.entity_type)
            .bind(entry.entity_id)
            .bind(&entry.metadata)
            .fetch_one(pool)
            .await
    }

    /// Most recent entries, newest first.
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM audit_logs ORDER BY id DESC LIMIT $1");
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(limit.clamp(1, 500))
            .fetch_all(pool)
            .await
    }
}
