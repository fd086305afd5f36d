//! Repository for the `executions` table.
//!
//! Terminal statuses are sticky: every status-changing statement guards on
//! the current status so a completed, failed, or cancelled execution is
//! never overwritten by a late writer.

use sqlx::PgPool;

use flowsync_core::types::DbId;

use crate::models::execution::Execution;
use crate::models::status::ExecutionStatus;

/// Column list for `executions` queries.
const COLUMNS: &str = "\
    id, workflow_id, status_id, input, output, error, triggered_by, \
    started_at, completed_at, created_at";

/// Provides CRUD operations for workflow executions.
pub struct ExecutionRepo;

impl ExecutionRepo {
    /// Create a new execution in `running` status with `started_at = NOW()`.
    pub async fn create(
        pool: &PgPool,
        workflow_id: DbId,
        input: &serde_json::Value,
        triggered_by: Option<&str>,
    ) -> Result<Execution, sqlx::Error> {
        let query = format!(
            "INSERT INTO executions (workflow_id, status_id, input, triggered_by, started_at) \
             VALUES ($1, $2, $3, $4, NOW()) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Execution>(&query)
            .bind(workflow_id)
            .bind(ExecutionStatus::Running.id())
            .bind(input)
            .bind(triggered_by)
            .fetch_one(pool)
            .await
    }

    /// Find an execution by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Execution>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM executions WHERE id = $1");
        sqlx::query_as::<_, Execution>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark a running execution completed with its output map.
    ///
    /// Returns `false` when the execution was no longer running (already
    /// terminal), in which case nothing was written.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        output: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, output = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(ExecutionStatus::Completed.id())
        .bind(output)
        .bind(ExecutionStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a running execution failed with an error message.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, error = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(ExecutionStatus::Failed.id())
        .bind(error)
        .bind(ExecutionStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel an execution unless it is already terminal.
    pub async fn cancel(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, completed_at = NOW() \
             WHERE id = $1 AND status_id IN ($3, $4)",
        )
        .bind(id)
        .bind(ExecutionStatus::Cancelled.id())
        .bind(ExecutionStatus::Pending.id())
        .bind(ExecutionStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
