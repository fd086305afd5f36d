//! Repository for the `job_queue` table: the durable FIFO.
//!
//! The dequeue path is a single statement built around
//! `SELECT ... FOR UPDATE SKIP LOCKED` so that any number of concurrent
//! workers (in one process or many) each claim a distinct row without
//! blocking on each other's locks.

use sqlx::PgPool;

use flowsync_core::types::{DbId, Timestamp};

use crate::models::queue::{QueueRow, QueueStats};
use crate::models::status::QueueStatus;

/// Column list for `job_queue` queries.
const COLUMNS: &str = "\
    id, execution_id, node_id, node_label, node_type, payload, status_id, \
    attempts, max_attempts, locked_at, locked_by, result, error, created_at";

/// Provides enqueue/dequeue operations for the durable job queue.
pub struct QueueRepo;

impl QueueRepo {
    /// Insert a pending row for a job, or re-arm an existing row for the
    /// same step id (retries reuse the id and re-enter the FIFO at the back).
    pub async fn enqueue(
        pool: &PgPool,
        id: DbId,
        execution_id: DbId,
        node_id: &str,
        node_label: &str,
        node_type: &str,
        payload: &serde_json::Value,
        max_attempts: i32,
    ) -> Result<QueueRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO job_queue \
                 (id, execution_id, node_id, node_label, node_type, payload, status_id, max_attempts) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET \
                 payload = EXCLUDED.payload, \
                 status_id = EXCLUDED.status_id, \
                 max_attempts = EXCLUDED.max_attempts, \
                 result = NULL, error = NULL, \
                 locked_at = NULL, locked_by = NULL, \
                 created_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueRow>(&query)
            .bind(id)
            .bind(execution_id)
            .bind(node_id)
            .bind(node_label)
            .bind(node_type)
            .bind(payload)
            .bind(QueueStatus::Pending.id())
            .bind(max_attempts)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest pending row for a worker.
    ///
    /// Sets `processing`, stamps `locked_at`/`locked_by`, and increments
    /// `attempts`. `None` means no eligible row, not an error.
    pub async fn dequeue(
        pool: &PgPool,
        worker_id: &str,
    ) -> Result<Option<QueueRow>, sqlx::Error> {
        let query = format!(
            "UPDATE job_queue \
             SET status_id = $2, locked_at = NOW(), locked_by = $1, attempts = attempts + 1 \
             WHERE id = ( \
                 SELECT id FROM job_queue \
                 WHERE status_id = $3 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueRow>(&query)
            .bind(worker_id)
            .bind(QueueStatus::Processing.id())
            .bind(QueueStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Record a successfully processed row.
    pub async fn mark_done(
        pool: &PgPool,
        id: DbId,
        result: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE job_queue \
             SET status_id = $2, result = $3, locked_at = NULL, locked_by = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(QueueStatus::Done.id())
        .bind(result)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed row.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE job_queue \
             SET status_id = $2, error = $3, locked_at = NULL, locked_by = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(QueueStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Live count of pending rows.
    pub async fn depth(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status_id = $1")
            .bind(QueueStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Aggregate queue counters.
    pub async fn stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT \
                 COALESCE(SUM(CASE WHEN status_id = $1 THEN 1 ELSE 0 END), 0), \
                 COUNT(*), \
                 COALESCE(SUM(CASE WHEN status_id = $2 THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN status_id = $3 THEN 1 ELSE 0 END), 0) \
             FROM job_queue",
        )
        .bind(QueueStatus::Pending.id())
        .bind(QueueStatus::Done.id())
        .bind(QueueStatus::Failed.id())
        .fetch_one(pool)
        .await?;

        Ok(QueueStats {
            depth: row.0,
            total_enqueued: row.1,
            total_processed: row.2,
            total_failed: row.3,
        })
    }

    /// Reclaim rows abandoned in `processing` by a crashed worker.
    ///
    /// Rows whose `locked_at` is older than `older_than` go back to
    /// `pending` if they still have attempts left, otherwise they are marked
    /// failed. Returns `(reclaimed, failed)` counts.
    pub async fn reclaim_stale(
        pool: &PgPool,
        older_than: Timestamp,
    ) -> Result<(u64, u64), sqlx::Error> {
        let failed = sqlx::query(
            "UPDATE job_queue \
             SET status_id = $1, error = 'Lock expired after final attempt', \
                 locked_at = NULL, locked_by = NULL \
             WHERE status_id = $2 AND locked_at < $3 AND attempts >= max_attempts",
        )
        .bind(QueueStatus::Failed.id())
        .bind(QueueStatus::Processing.id())
        .bind(older_than)
        .execute(pool)
        .await?
        .rows_affected();

        let reclaimed = sqlx::query(
            "UPDATE job_queue \
             SET status_id = $1, locked_at = NULL, locked_by = NULL \
             WHERE status_id = $2 AND locked_at < $3",
        )
        .bind(QueueStatus::Pending.id())
        .bind(QueueStatus::Processing.id())
        .bind(older_than)
        .execute(pool)
        .await?
        .rows_affected();

        Ok((reclaimed, failed))
    }
}
