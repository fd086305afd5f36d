//! Dead-letter sink for jobs that exhausted their retries.
//!
//! Append-only; entries are never retried automatically. Operators inspect
//! and re-drive them out of band.

use std::sync::Mutex;

use serde::Serialize;

use flowsync_core::types::Timestamp;

use crate::job::WorkerJob;

/// One permanently failed job.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub job: WorkerJob,
    pub error: String,
    pub attempts: u32,
    pub failed_at: Timestamp,
}

/// Aggregate view of the sink.
#[derive(Debug, Clone, Serialize)]
pub struct DlqStats {
    pub size: usize,
    pub last_failure_at: Option<Timestamp>,
}

/// In-process dead-letter collection.
#[derive(Default)]
pub struct DeadLetterSink {
    entries: Mutex<Vec<DeadLetter>>,
}

impl DeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a permanently failed job.
    pub fn add(&self, job: WorkerJob, error: impl Into<String>, attempts: u32) {
        let mut entries = self.entries.lock().expect("dlq lock poisoned");
        entries.push(DeadLetter {
            job,
            error: error.into(),
            attempts,
            failed_at: chrono::Utc::now(),
        });
    }

    /// Snapshot of all entries, oldest first.
    pub fn items(&self) -> Vec<DeadLetter> {
        self.entries.lock().expect("dlq lock poisoned").clone()
    }

    pub fn stats(&self) -> DlqStats {
        let entries = self.entries.lock().expect("dlq lock poisoned");
        DlqStats {
            size: entries.len(),
            last_failure_at: entries.last().map(|e| e.failed_at),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().expect("dlq lock poisoned").clear();
    }
}
