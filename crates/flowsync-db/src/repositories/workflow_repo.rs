//! Repository for the `workflows` table.
//!
//! Workflow rows are immutable `(name, version)` snapshots: definition
//! changes insert a fresh row instead of updating in place, so running
//! executions keep the exact definition they started with.

use sqlx::PgPool;

use flowsync_core::types::DbId;

use crate::models::status::WorkflowStatus;
use crate::models::workflow::{CreateWorkflow, Workflow};

/// Column list for `workflows` queries.
const COLUMNS: &str = "id, name, version, status_id, definition, created_at, updated_at";

/// Provides CRUD operations for workflow snapshots.
pub struct WorkflowRepo;

impl WorkflowRepo {
    /// Create version 1 of a new workflow in `draft` status.
    pub async fn create(pool: &PgPool, input: &CreateWorkflow) -> Result<Workflow, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflows (name, version, status_id, definition) \
             VALUES ($1, 1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(&input.name)
            .bind(WorkflowStatus::Draft.id())
            .bind(&input.definition)
            .fetch_one(pool)
            .await
    }

    /// Insert a new frozen version of an existing workflow.
    ///
    /// The new row starts in `draft`; the prior version keeps its status so
    /// running executions are unaffected.
    pub async fn create_version(
        pool: &PgPool,
        workflow_id: DbId,
        definition: &serde_json::Value,
    ) -> Result<Workflow, sqlx::Error> {
        let current = Self::find_by_id(pool, workflow_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let query = format!(
            "INSERT INTO workflows (name, version, status_id, definition) \
             SELECT $1, COALESCE(MAX(version), 0) + 1, $2, $3 \
             FROM workflows WHERE name = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(&current.name)
            .bind(WorkflowStatus::Draft.id())
            .bind(definition)
            .fetch_one(pool)
            .await
    }

    /// Find a workflow snapshot by its row id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE id = $1");
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all versions of a workflow by name, newest first.
    pub async fn list_versions(pool: &PgPool, name: &str) -> Result<Vec<Workflow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE name = $1 ORDER BY version DESC");
        sqlx::query_as::<_, Workflow>(&query)
            .bind(name)
            .fetch_all(pool)
            .await
    }

    /// Set the snapshot's status (draft -> active, active -> archived).
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: WorkflowStatus,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflows SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(pool)
            .await
    }
}
