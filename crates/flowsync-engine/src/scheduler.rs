//! Cron scheduler: a single long-lived tick loop that fires due triggers.
//!
//! Ticks are non-overlapping (a slow tick causes the next to be skipped,
//! not queued behind it) and firing is detached: the tick never waits for
//! the execution it started.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use flowsync_core::cron::CronExpr;
use flowsync_core::types::Timestamp;
use flowsync_db::models::{Trigger, WorkflowStatus};
use flowsync_events::{EngineEvent, EventBus};

use crate::orchestrator::Orchestrator;
use crate::store::EngineStore;

/// Fires workflows from enabled cron triggers.
pub struct Scheduler {
    store: Arc<dyn EngineStore>,
    orchestrator: Arc<Orchestrator>,
    bus: Arc<EventBus>,
    tick_interval: Duration,
    tick_guard: tokio::sync::Mutex<()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn EngineStore>,
        orchestrator: Arc<Orchestrator>,
        bus: Arc<EventBus>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            orchestrator,
            bus,
            tick_interval,
            tick_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Run the tick loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }

    /// One evaluation pass over all enabled cron triggers.
    ///
    /// Public so tests can drive the scheduler at chosen instants.
    pub async fn tick(&self, now: Timestamp) {
        // Re-entrant ticks are skipped, never stacked.
        let Ok(_guard) = self.tick_guard.try_lock() else {
            tracing::warn!("Scheduler tick skipped: previous tick still running");
            return;
        };

        let triggers = match self.store.list_enabled_cron_triggers().await {
            Ok(triggers) => triggers,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load cron triggers");
                return;
            }
        };

        for trigger in triggers {
            self.evaluate(trigger, now).await;
        }
    }

    async fn evaluate(&self, trigger: Trigger, now: Timestamp) {
        let workflow = match self.store.find_workflow(trigger.workflow_id).await {
            Ok(Some(workflow)) => workflow,
            Ok(None) => {
                tracing::warn!(
                    trigger_id = trigger.id,
                    workflow_id = trigger.workflow_id,
                    "Trigger references a missing workflow"
                );
                return;
            }
            Err(e) => {
                tracing::error!(trigger_id = trigger.id, error = %e, "Trigger workflow load failed");
                return;
            }
        };
        if workflow.status_id != WorkflowStatus::Active.id() {
            return;
        }

        let Some(raw) = trigger.cron_expression() else {
            tracing::warn!(trigger_id = trigger.id, "Cron trigger has no expression");
            return;
        };
        let expr = match CronExpr::parse(raw) {
            Ok(expr) => expr,
            Err(e) => {
                tracing::warn!(trigger_id = trigger.id, expression = raw, error = %e, "Invalid cron expression");
                return;
            }
        };

        if !expr.matches(now) {
            return;
        }

        // Anti-double-fire: at most one start per (trigger, calendar minute).
        if let Some(last) = trigger.last_fired_at {
            if same_minute(last, now) {
                tracing::debug!(trigger_id = trigger.id, "Already fired this minute");
                return;
            }
        }

        if let Err(e) = self
            .store
            .record_trigger_fired(trigger.id, now, expr.next_run(now))
            .await
        {
            tracing::error!(trigger_id = trigger.id, error = %e, "Failed to record trigger firing");
            return;
        }

        self.bus.publish(
            EngineEvent::new("trigger.fired")
                .with_entity("trigger", trigger.id)
                .with_payload(json!({ "workflowId": trigger.workflow_id })),
        );
        tracing::info!(
            trigger_id = trigger.id,
            workflow_id = trigger.workflow_id,
            "Cron trigger fired"
        );

        // Detached: the tick must not block on the execution.
        let orchestrator = Arc::clone(&self.orchestrator);
        let workflow_id = trigger.workflow_id;
        let input = trigger.input();
        tokio::spawn(async move {
            match orchestrator
                .execute_workflow(workflow_id, input, Some("cron"))
                .await
            {
                Ok(report) => tracing::info!(
                    workflow_id,
                    execution_id = report.execution_id,
                    status = %report.status,
                    "Cron-triggered execution finished"
                ),
                Err(e) => tracing::error!(
                    workflow_id,
                    error = %e,
                    "Cron-triggered execution failed to start"
                ),
            }
        });
    }
}

/// Whether two instants fall in the same calendar minute.
fn same_minute(a: Timestamp, b: Timestamp) -> bool {
    a.date_naive() == b.date_naive() && a.hour() == b.hour() && a.minute() == b.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn same_minute_ignores_seconds() {
        let a = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 5).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 55).unwrap();
        assert!(same_minute(a, b));
    }

    #[test]
    fn different_minutes_do_not_match() {
        let a = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 59).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 3, 10, 9, 31, 0).unwrap();
        assert!(!same_minute(a, b));

        let c = Utc.with_ymd_and_hms(2025, 3, 11, 9, 30, 0).unwrap();
        assert!(!same_minute(a, c));
    }
}
