//! Repository for the `triggers` table.

use sqlx::PgPool;

use flowsync_core::types::{DbId, Timestamp};

use crate::models::trigger::{trigger_types, CreateTrigger, Trigger};

/// Column list for `triggers` queries.
const COLUMNS: &str = "\
    id, workflow_id, trigger_type, config, enabled, last_fired_at, \
    next_run_at, created_at, updated_at";

/// Provides CRUD operations for workflow triggers.
pub struct TriggerRepo;

impl TriggerRepo {
    /// Create a new trigger.
    pub async fn create(pool: &PgPool, input: &CreateTrigger) -> Result<Trigger, sqlx::Error> {
        let query = format!(
            "INSERT INTO triggers (workflow_id, trigger_type, config, enabled) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(input.workflow_id)
            .bind(&input.trigger_type)
            .bind(&input.config)
            .bind(input.enabled)
            .fetch_one(pool)
            .await
    }

    /// Find a trigger by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Trigger>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM triggers WHERE id = $1");
        sqlx::query_as::<_, Trigger>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All enabled cron triggers, the scheduler's per-tick working set.
    pub async fn list_enabled_cron(pool: &PgPool) -> Result<Vec<Trigger>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM triggers \
             WHERE trigger_type = $1 AND enabled = TRUE \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(trigger_types::CRON)
            .fetch_all(pool)
            .await
    }

    /// Stamp a trigger as fired and record its next scheduled run.
    pub async fn record_fired(
        pool: &PgPool,
        id: DbId,
        fired_at: Timestamp,
        next_run_at: Option<Timestamp>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE triggers \
             SET last_fired_at = $2, next_run_at = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(fired_at)
        .bind(next_run_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Enable or disable a trigger.
    pub async fn set_enabled(pool: &PgPool, id: DbId, enabled: bool) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE triggers SET enabled = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(enabled)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
