//! Workflow entity model.
//!
//! A workflow row is an immutable `(name, version)` snapshot of a DAG
//! definition. Changing the definition inserts a new row with a bumped
//! version; executions keep referencing the row they started with.

use flowsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `workflows` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Workflow {
    pub id: DbId,
    pub name: String,
    pub version: i32,
    pub status_id: i16,
    pub definition: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Workflow {
    /// Deserialize the stored definition into the DAG model.
    pub fn parsed_definition(
        &self,
    ) -> Result<flowsync_core::dag::WorkflowDefinition, serde_json::Error> {
        serde_json::from_value(self.definition.clone())
    }
}

/// Input for creating a new workflow snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflow {
    pub name: String,
    pub definition: serde_json::Value,
}
