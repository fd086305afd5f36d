//! Trigger entity model.

use flowsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Trigger type wire names.
pub mod trigger_types {
    pub const MANUAL: &str = "manual";
    pub const WEBHOOK: &str = "webhook";
    pub const CRON: &str = "cron";
}

/// A row from the `triggers` table.
///
/// Only `cron` triggers fire from the scheduler; `manual` and `webhook`
/// rows describe how an execution may be started from the outside.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Trigger {
    pub id: DbId,
    pub workflow_id: DbId,
    pub trigger_type: String,
    pub config: serde_json::Value,
    pub enabled: bool,
    pub last_fired_at: Option<Timestamp>,
    pub next_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Trigger {
    /// The cron expression, for `cron` triggers.
    pub fn cron_expression(&self) -> Option<&str> {
        self.config.get("expression").and_then(|v| v.as_str())
    }

    /// Optional execution input carried by the trigger config.
    pub fn input(&self) -> serde_json::Value {
        self.config
            .get("input")
            .cloned()
            .unwrap_or(serde_json::Value::Object(Default::default()))
    }
}

/// Input for creating a new trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTrigger {
    pub workflow_id: DbId,
    pub trigger_type: String,
    pub config: serde_json::Value,
    pub enabled: bool,
}
