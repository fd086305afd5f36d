//! Engine counters. Write-only from the engine's perspective: metrics never
//! influence control flow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Process-wide engine counters. Step counters are keyed by node type.
#[derive(Default)]
pub struct EngineMetrics {
    executions_started: AtomicU64,
    executions_completed: AtomicU64,
    executions_failed: AtomicU64,
    executions_cancelled: AtomicU64,
    jobs_published: AtomicU64,
    jobs_processed: AtomicU64,
    retries: AtomicU64,
    publish_rejections: AtomicU64,
    dlq_entries: AtomicU64,
    steps_by_node_type: Mutex<HashMap<String, u64>>,
}

/// Point-in-time serializable view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub executions_started: u64,
    pub executions_completed: u64,
    pub executions_failed: u64,
    pub executions_cancelled: u64,
    pub jobs_published: u64,
    pub jobs_processed: u64,
    pub retries: u64,
    pub publish_rejections: u64,
    pub dlq_entries: u64,
    pub steps_by_node_type: HashMap<String, u64>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execution_started(&self) {
        self.executions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn execution_completed(&self) {
        self.executions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn execution_failed(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn execution_cancelled(&self) {
        self.executions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_published(&self) {
        self.jobs_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_rejected(&self) {
        self.publish_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dlq_entry(&self) {
        self.dlq_entries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one settled step against its node type.
    pub fn step_settled(&self, node_type: &str) {
        let mut map = self
            .steps_by_node_type
            .lock()
            .expect("metrics lock poisoned");
        *map.entry(node_type.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executions_started: self.executions_started.load(Ordering::Relaxed),
            executions_completed: self.executions_completed.load(Ordering::Relaxed),
            executions_failed: self.executions_failed.load(Ordering::Relaxed),
            executions_cancelled: self.executions_cancelled.load(Ordering::Relaxed),
            jobs_published: self.jobs_published.load(Ordering::Relaxed),
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            publish_rejections: self.publish_rejections.load(Ordering::Relaxed),
            dlq_entries: self.dlq_entries.load(Ordering::Relaxed),
            steps_by_node_type: self
                .steps_by_node_type
                .lock()
                .expect("metrics lock poisoned")
                .clone(),
        }
    }
}
