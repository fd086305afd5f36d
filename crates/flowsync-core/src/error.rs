use crate::types::DbId;

/// Domain-level error type shared across the workspace.
///
/// Infrastructure failures (database, queue) are wrapped into
/// [`CoreError::Infrastructure`] at the storage boundary so callers above
/// the store traits never see `sqlx` types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Workflow {workflow_id} is not active")]
    NotActive { workflow_id: DbId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl CoreError {
    /// Wrap an arbitrary storage error into an infrastructure error.
    pub fn infra(err: impl std::fmt::Display) -> Self {
        CoreError::Infrastructure(err.to_string())
    }
}
