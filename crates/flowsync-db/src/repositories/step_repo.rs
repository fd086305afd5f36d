//! Repository for the `step_executions` table.

use sqlx::PgPool;

use flowsync_core::types::DbId;

use crate::models::status::StepStatus;
use crate::models::step::StepExecution;

/// Column list for `step_executions` queries.
const COLUMNS: &str = "\
    id, execution_id, node_id, node_label, node_type, status_id, attempts, \
    result, error, started_at, completed_at, created_at";

/// Provides CRUD operations for step executions.
pub struct StepRepo;

impl StepRepo {
    /// Create a step row in `pending` status with `started_at = NOW()`.
    ///
    /// `attempts` is the 1-based ordinal of the attempt being scheduled.
    pub async fn create(
        pool: &PgPool,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
        attempts: i32,
    ) -> Result<StepExecution, sqlx::Error> {
        let query = format!(
            "INSERT INTO step_executions \
                 (execution_id, node_id, node_label, node_type, status_id, attempts, started_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StepExecution>(&query)
            .bind(execution_id)
            .bind(node_id)
            .bind(node_label)
            .bind(node_type)
            .bind(StepStatus::Pending.id())
            .bind(attempts)
            .fetch_one(pool)
            .await
    }

    /// Create a step row directly in `skipped` status (deactivated branch).
    pub async fn create_skipped(
        pool: &PgPool,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
    ) -> Result<StepExecution, sqlx::Error> {
        let query = format!(
            "INSERT INTO step_executions \
                 (execution_id, node_id, node_label, node_type, status_id, attempts, completed_at) \
             VALUES ($1, $2, $3, $4, $5, 0, NOW()) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StepExecution>(&query)
            .bind(execution_id)
            .bind(node_id)
            .bind(node_label)
            .bind(node_type)
            .bind(StepStatus::Skipped.id())
            .fetch_one(pool)
            .await
    }

    /// Find a step by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StepExecution>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM step_executions WHERE id = $1");
        sqlx::query_as::<_, StepExecution>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all steps of an execution in creation order.
    pub async fn list_by_execution(
        pool: &PgPool,
        execution_id: DbId,
    ) -> Result<Vec<StepExecution>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM step_executions WHERE execution_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, StepExecution>(&query)
            .bind(execution_id)
            .fetch_all(pool)
            .await
    }

    /// Move a pending step to `running`, stamping the attempt ordinal.
    ///
    /// Returns `false` when the step is no longer pending (cancelled or
    /// skipped in the meantime), in which case the caller must not run it.
    pub async fn mark_running(pool: &PgPool, id: DbId, attempts: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE step_executions SET status_id = $2, attempts = $3 \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(StepStatus::Running.id())
        .bind(attempts)
        .bind(StepStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a completed step with its result payload.
    pub async fn mark_completed(
        pool: &PgPool,
        id: DbId,
        result: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE step_executions \
             SET status_id = $2, result = $3, error = NULL, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(StepStatus::Completed.id())
        .bind(result)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a terminally failed step.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE step_executions \
             SET status_id = $2, error = $3, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(StepStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Reset a step to `pending` ahead of a retry attempt.
    pub async fn reset_for_retry(
        pool: &PgPool,
        id: DbId,
        error: &str,
        attempts: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE step_executions \
             SET status_id = $2, error = $3, attempts = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(StepStatus::Pending.id())
        .bind(error)
        .bind(attempts)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Sweep every pending or running step of an execution to `skipped`.
    ///
    /// Used when an execution fails terminally or is cancelled. Returns the
    /// number of steps swept.
    pub async fn skip_unsettled(pool: &PgPool, execution_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE step_executions \
             SET status_id = $2, completed_at = NOW() \
             WHERE execution_id = $1 AND status_id IN ($3, $4)",
        )
        .bind(execution_id)
        .bind(StepStatus::Skipped.id())
        .bind(StepStatus::Pending.id())
        .bind(StepStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a step row (duplicate-publication rollback).
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM step_executions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
