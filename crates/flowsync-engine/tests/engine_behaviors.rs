//! Behavioral properties: publication idempotency, backpressure admission,
//! cancellation semantics, the orchestrator deadline, and scheduler firing.

mod support;

use std::time::Duration;

use chrono::Timelike;
use serde_json::{json, Map};

use flowsync_core::error::CoreError;
use flowsync_db::models::{ExecutionStatus, StepStatus, WorkflowStatus};
use flowsync_engine::backpressure::BackpressureThresholds;
use flowsync_engine::publisher::PublishRequest;
use flowsync_engine::store::{EngineStore, JobQueue};

use support::{engine, test_config};

fn linear_definition() -> serde_json::Value {
    json!({
        "nodes": [
            {"id": "start", "type": "start", "label": "Start", "config": {}},
            {"id": "A", "type": "action", "label": "A", "config": {}},
            {"id": "end", "type": "end", "label": "End", "config": {}}
        ],
        "edges": [
            {"id": "e1", "source": "start", "target": "A"},
            {"id": "e2", "source": "A", "target": "end"}
        ]
    })
}

fn node(raw: serde_json::Value) -> flowsync_core::dag::Node {
    serde_json::from_value(raw).unwrap()
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_publication_returns_the_existing_step() {
    let eng = engine(test_config());
    // No consumer interference: stop the pool before publishing.
    eng.cancel.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let workflow =
        eng.store
            .seed_workflow("dup", linear_definition(), WorkflowStatus::Active);
    let execution = eng
        .store
        .create_execution(workflow.id, &json!({}), None)
        .await
        .unwrap();

    let action = node(json!({"id": "A", "type": "action", "label": "A", "config": {}}));

    let first = eng
        .publisher
        .publish(PublishRequest::new(
            execution.id,
            action.clone(),
            json!({}),
            Map::new(),
            vec![],
        ))
        .await
        .unwrap();

    let second = eng
        .publisher
        .publish(PublishRequest::new(
            execution.id,
            action,
            json!({}),
            Map::new(),
            vec![],
        ))
        .await
        .unwrap();

    assert_eq!(first, second, "duplicate returns the original step id");

    // Only one step row and one queue row exist.
    let steps = eng.store.list_steps(execution.id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(eng.queue.depth().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saturated_queue_rejects_publication_but_keeps_the_step() {
    let mut config = test_config();
    config.backpressure = BackpressureThresholds {
        low_water: 0,
        high_water: 1,
        max_depth: 1,
    };
    let eng = engine(config);
    eng.cancel.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let workflow =
        eng.store
            .seed_workflow("saturated", linear_definition(), WorkflowStatus::Active);
    let execution = eng
        .store
        .create_execution(workflow.id, &json!({}), None)
        .await
        .unwrap();

    let first = node(json!({"id": "A", "type": "action", "label": "A", "config": {}}));
    let second = node(json!({"id": "B", "type": "action", "label": "B", "config": {}}));

    eng.publisher
        .publish(PublishRequest::new(execution.id, first, json!({}), Map::new(), vec![]))
        .await
        .unwrap();

    let rejected_step = eng
        .publisher
        .publish(PublishRequest::new(execution.id, second, json!({}), Map::new(), vec![]))
        .await
        .unwrap();

    // The step row exists and stays pending, but nothing was enqueued.
    let step = eng.store.find_step(rejected_step).await.unwrap().unwrap();
    assert_eq!(StepStatus::from_id(step.status_id), Some(StepStatus::Pending));
    assert_eq!(eng.queue.depth().await.unwrap(), 1);
    assert_eq!(eng.metrics.snapshot().publish_rejections, 1);
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_workflow_is_not_found() {
    let eng = engine(test_config());
    let err = eng
        .orchestrator
        .execute_workflow(9999, json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "workflow", id: 9999 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn draft_workflow_is_rejected_as_not_active() {
    let eng = engine(test_config());
    let workflow = eng
        .store
        .seed_workflow("draft", linear_definition(), WorkflowStatus::Draft);

    let err = eng
        .orchestrator
        .execute_workflow(workflow.id, json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotActive { .. }));

    // Nothing was created or enqueued.
    assert_eq!(eng.metrics.snapshot().executions_started, 0);
    assert_eq!(eng.queue.depth().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_reports_failure_but_execution_finishes_later() {
    let mut config = test_config();
    config.orchestrator_timeout = Duration::from_millis(100);
    let eng = engine(config);

    let workflow = eng.store.seed_workflow(
        "slow",
        json!({
            "nodes": [
                {"id": "start", "type": "start", "label": "Start", "config": {}},
                {"id": "D", "type": "delay", "label": "D", "config": {"delayMs": 400}},
                {"id": "end", "type": "end", "label": "End", "config": {}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "D"},
                {"id": "e2", "source": "D", "target": "end"}
            ]
        }),
        WorkflowStatus::Active,
    );

    let report = eng
        .orchestrator
        .execute_workflow(workflow.id, json!({}), None)
        .await
        .unwrap();

    assert_eq!(report.status, "failed");
    assert!(report.error.unwrap().contains("timed out"));

    // The deadline does not roll back in-flight steps: the delay finishes
    // and the execution still completes in the store.
    tokio::time::sleep(Duration::from_millis(900)).await;
    let execution = eng
        .store
        .find_execution(report.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        ExecutionStatus::from_id(execution.status_id),
        Some(ExecutionStatus::Completed)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_is_sticky_and_does_not_advance_the_dag() {
    let mut config = test_config();
    config.orchestrator_timeout = Duration::from_secs(5);
    let eng = engine(config);

    let workflow = eng.store.seed_workflow(
        "cancellable",
        json!({
            "nodes": [
                {"id": "start", "type": "start", "label": "Start", "config": {}},
                {"id": "D", "type": "delay", "label": "D", "config": {"delayMs": 300}},
                {"id": "after", "type": "action", "label": "After", "config": {}},
                {"id": "end", "type": "end", "label": "End", "config": {}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "D"},
                {"id": "e2", "source": "D", "target": "after"},
                {"id": "e3", "source": "after", "target": "end"}
            ]
        }),
        WorkflowStatus::Active,
    );

    let orchestrator = eng.orchestrator.clone();
    let wf_id = workflow.id;
    let run = tokio::spawn(async move {
        orchestrator.execute_workflow(wf_id, json!({}), None).await
    });

    // Let the delay node get in flight, then cancel.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let execution_id = {
        // The only execution in the store has id following the workflow's.
        let mut id = None;
        for candidate in 1..20 {
            if let Some(e) = eng.store.find_execution(candidate).await.unwrap() {
                id = Some(e.id);
                break;
            }
        }
        id.expect("execution should exist")
    };

    assert!(eng.orchestrator.cancel_execution(execution_id).await.unwrap());
    // Cancelling twice is a no-op: the state is sticky.
    assert!(!eng.orchestrator.cancel_execution(execution_id).await.unwrap());

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.status, "cancelled");

    // The in-flight delay handler runs to completion, but the DAG must not
    // advance: "after" and "end" never get scheduled.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let execution = eng.store.find_execution(execution_id).await.unwrap().unwrap();
    assert_eq!(
        ExecutionStatus::from_id(execution.status_id),
        Some(ExecutionStatus::Cancelled)
    );
    let steps = eng.store.list_steps(execution_id).await.unwrap();
    assert!(steps.iter().all(|s| s.node_id != "after"));
    assert!(steps.iter().all(|s| s.node_id != "end"));
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cron_trigger_fires_once_per_minute() {
    let eng = engine(test_config());
    let workflow =
        eng.store
            .seed_workflow("scheduled", linear_definition(), WorkflowStatus::Active);
    let trigger = eng
        .store
        .seed_cron_trigger(workflow.id, json!({"expression": "* * * * *"}), true);

    // Pin to the start of the minute so the +10s tick stays inside it.
    let now = chrono::Utc::now().with_second(0).unwrap();
    eng.scheduler.tick(now).await;
    // Second tick in the same calendar minute must not double-fire.
    eng.scheduler.tick(now + chrono::Duration::seconds(10)).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(eng.metrics.snapshot().executions_started, 1);
    assert!(eng.store.trigger_last_fired(trigger.id).is_some());

    // The next minute fires again.
    eng.scheduler.tick(now + chrono::Duration::minutes(1)).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(eng.metrics.snapshot().executions_started, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_triggers_and_inactive_workflows_do_not_fire() {
    let eng = engine(test_config());

    let active =
        eng.store
            .seed_workflow("active", linear_definition(), WorkflowStatus::Active);
    eng.store
        .seed_cron_trigger(active.id, json!({"expression": "* * * * *"}), false);

    let draft = eng
        .store
        .seed_workflow("draft", linear_definition(), WorkflowStatus::Draft);
    eng.store
        .seed_cron_trigger(draft.id, json!({"expression": "* * * * *"}), true);

    // Bad expressions are logged and skipped, never fired.
    eng.store
        .seed_cron_trigger(active.id, json!({"expression": "not cron"}), true);

    eng.scheduler.tick(chrono::Utc::now()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(eng.metrics.snapshot().executions_started, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_matching_expression_does_not_fire() {
    let eng = engine(test_config());
    let workflow =
        eng.store
            .seed_workflow("offpeak", linear_definition(), WorkflowStatus::Active);
    // Fires only at 03:33.
    eng.store
        .seed_cron_trigger(workflow.id, json!({"expression": "33 3 * * *"}), true);

    let not_matching = chrono::Utc::now()
        .date_naive()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc();
    eng.scheduler.tick(not_matching).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(eng.metrics.snapshot().executions_started, 0);
}

// ---------------------------------------------------------------------------
// Consumer shutdown
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_drains_in_flight_jobs() {
    let eng = engine(test_config());
    let workflow =
        eng.store
            .seed_workflow("drained", linear_definition(), WorkflowStatus::Active);

    let report = eng
        .orchestrator
        .execute_workflow(workflow.id, json!({}), None)
        .await
        .unwrap();
    assert_eq!(report.status, "completed");

    // Shutdown after completion returns promptly.
    tokio::time::timeout(Duration::from_secs(5), eng.consumer.shutdown())
        .await
        .expect("drain must finish inside the timeout");
}
