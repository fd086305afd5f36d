//! Locked-dequeue semantics for the durable job queue.
//!
//! These tests run against a live PostgreSQL instance provisioned by
//! `#[sqlx::test]` with the crate's embedded migrations applied.

use serde_json::json;
use sqlx::PgPool;

use flowsync_db::models::{CreateWorkflow, QueueStatus};
use flowsync_db::repositories::{ExecutionRepo, QueueRepo, StepRepo, WorkflowRepo};

/// Create a workflow + execution + step and enqueue a job for it.
/// Returns the step (= queue row) id.
async fn enqueue_one(pool: &PgPool, node_id: &str) -> i64 {
    let workflow = WorkflowRepo::create(
        pool,
        &CreateWorkflow {
            name: format!("wf-{node_id}"),
            definition: json!({"nodes": [], "edges": []}),
        },
    )
    .await
    .unwrap();

    let execution = ExecutionRepo::create(pool, workflow.id, &json!({}), None)
        .await
        .unwrap();

    let step = StepRepo::create(pool, execution.id, node_id, node_id, "action", 1)
        .await
        .unwrap();

    QueueRepo::enqueue(
        pool,
        step.id,
        execution.id,
        node_id,
        node_id,
        "action",
        &json!({"node": node_id}),
        1,
    )
    .await
    .unwrap();

    step.id
}

#[sqlx::test(migrations = "./migrations")]
async fn dequeue_claims_oldest_pending_row(pool: PgPool) {
    let first = enqueue_one(&pool, "a").await;
    let second = enqueue_one(&pool, "b").await;

    let row = QueueRepo::dequeue(&pool, "worker-1").await.unwrap().unwrap();
    assert_eq!(row.id, first);
    assert_eq!(row.status_id, QueueStatus::Processing.id());
    assert_eq!(row.attempts, 1);
    assert_eq!(row.locked_by.as_deref(), Some("worker-1"));
    assert!(row.locked_at.is_some());

    let row = QueueRepo::dequeue(&pool, "worker-2").await.unwrap().unwrap();
    assert_eq!(row.id, second);

    assert!(QueueRepo::dequeue(&pool, "worker-3").await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_workers_claim_distinct_rows(pool: PgPool) {
    let mut ids = Vec::new();
    for i in 0..20 {
        ids.push(enqueue_one(&pool, &format!("n{i}")).await);
    }

    let mut handles = Vec::new();
    for w in 0..5 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                match QueueRepo::dequeue(&pool, &format!("worker-{w}")).await.unwrap() {
                    Some(row) => claimed.push(row.id),
                    None => break,
                }
            }
            claimed
        }));
    }

    let mut all: Vec<i64> = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    all.sort_unstable();
    let mut expected = ids.clone();
    expected.sort_unstable();
    assert_eq!(all, expected, "every job claimed exactly once");
}

#[sqlx::test(migrations = "./migrations")]
async fn done_and_failed_rows_are_not_redelivered(pool: PgPool) {
    let id = enqueue_one(&pool, "a").await;

    let row = QueueRepo::dequeue(&pool, "w").await.unwrap().unwrap();
    assert_eq!(row.id, id);
    QueueRepo::mark_done(&pool, id, &json!({"ok": true})).await.unwrap();

    assert!(QueueRepo::dequeue(&pool, "w").await.unwrap().is_none());

    let stats = QueueRepo::stats(&pool).await.unwrap();
    assert_eq!(stats.depth, 0);
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_failed, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn reenqueue_rearms_the_same_row_id(pool: PgPool) {
    let id = enqueue_one(&pool, "a").await;

    let row = QueueRepo::dequeue(&pool, "w").await.unwrap().unwrap();
    QueueRepo::mark_failed(&pool, row.id, "boom").await.unwrap();

    // Retry path reuses the step id with a fresh payload and max_attempts.
    QueueRepo::enqueue(&pool, id, row.execution_id, "a", "a", "action", &json!({"attempt": 2}), 2)
        .await
        .unwrap();

    let row = QueueRepo::dequeue(&pool, "w").await.unwrap().unwrap();
    assert_eq!(row.id, id);
    assert_eq!(row.payload, json!({"attempt": 2}));
    assert_eq!(row.attempts, 2, "attempts accumulate across re-enqueues");
    assert!(row.error.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn reclaim_resets_stale_processing_rows(pool: PgPool) {
    let id = enqueue_one(&pool, "a").await;
    let row = QueueRepo::dequeue(&pool, "crashed-worker").await.unwrap().unwrap();
    assert_eq!(row.id, id);

    // Nothing is stale yet.
    let cutoff = chrono::Utc::now() - chrono::Duration::minutes(5);
    let (reclaimed, failed) = QueueRepo::reclaim_stale(&pool, cutoff).await.unwrap();
    assert_eq!((reclaimed, failed), (0, 0));

    // With a future cutoff the lock counts as expired. max_attempts is 1 and
    // the row already burned its attempt, so it fails rather than re-queues.
    let cutoff = chrono::Utc::now() + chrono::Duration::minutes(5);
    let (reclaimed, failed) = QueueRepo::reclaim_stale(&pool, cutoff).await.unwrap();
    assert_eq!((reclaimed, failed), (0, 1));
}

#[sqlx::test(migrations = "./migrations")]
async fn reclaim_requeues_rows_with_attempts_left(pool: PgPool) {
    let workflow = WorkflowRepo::create(
        &pool,
        &CreateWorkflow {
            name: "wf-reclaim".into(),
            definition: json!({"nodes": [], "edges": []}),
        },
    )
    .await
    .unwrap();
    let execution = ExecutionRepo::create(&pool, workflow.id, &json!({}), None)
        .await
        .unwrap();
    let step = StepRepo::create(&pool, execution.id, "a", "a", "action", 1)
        .await
        .unwrap();
    QueueRepo::enqueue(&pool, step.id, execution.id, "a", "a", "action", &json!({}), 3)
        .await
        .unwrap();

    QueueRepo::dequeue(&pool, "crashed-worker").await.unwrap().unwrap();

    let cutoff = chrono::Utc::now() + chrono::Duration::minutes(5);
    let (reclaimed, failed) = QueueRepo::reclaim_stale(&pool, cutoff).await.unwrap();
    assert_eq!((reclaimed, failed), (1, 0));

    let row = QueueRepo::dequeue(&pool, "rescue-worker").await.unwrap().unwrap();
    assert_eq!(row.id, step.id);
    assert_eq!(row.attempts, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn deleting_a_workflow_cascades_to_queue_rows(pool: PgPool) {
    let workflow = WorkflowRepo::create(
        &pool,
        &CreateWorkflow {
            name: "wf-cascade".into(),
            definition: json!({"nodes": [], "edges": []}),
        },
    )
    .await
    .unwrap();
    let execution = ExecutionRepo::create(&pool, workflow.id, &json!({}), None)
        .await
        .unwrap();
    let step = StepRepo::create(&pool, execution.id, "a", "a", "action", 1)
        .await
        .unwrap();
    QueueRepo::enqueue(&pool, step.id, execution.id, "a", "a", "action", &json!({}), 1)
        .await
        .unwrap();

    sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(workflow.id)
        .execute(&pool)
        .await
        .unwrap();

    assert!(StepRepo::find_by_id(&pool, step.id).await.unwrap().is_none());
    assert_eq!(QueueRepo::depth(&pool).await.unwrap(), 0);
}
