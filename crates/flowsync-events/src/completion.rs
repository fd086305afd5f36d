//! One-shot completion signals keyed by execution id.
//!
//! The orchestrator registers interest in an execution's terminal state
//! before publishing its first job; whichever component drives the execution
//! terminal (result handler, cancellation, failure sweep) completes the
//! signal exactly once. Late or repeated completions are no-ops.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::oneshot;

use flowsync_core::types::DbId;

/// Terminal outcome delivered to whoever awaits an execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    /// `"completed"`, `"failed"`, or `"cancelled"`.
    pub status: String,
    /// `node_id -> result` map, present on completion.
    pub output: Option<serde_json::Value>,
    /// Failure reason, present on failure.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn completed(output: serde_json::Value) -> Self {
        Self {
            status: "completed".to_string(),
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: "cancelled".to_string(),
            output: None,
            error: Some("Execution cancelled".to_string()),
        }
    }
}

/// Concurrent map of pending one-shot completion channels.
#[derive(Default)]
pub struct CompletionSignals {
    pending: Mutex<HashMap<DbId, oneshot::Sender<ExecutionOutcome>>>,
}

impl CompletionSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in an execution's terminal transition.
    ///
    /// Must be called strictly before the execution's first job is enqueued,
    /// otherwise a fast completion could be lost. Re-registering for the
    /// same id replaces the previous waiter (which then never resolves).
    pub fn register(&self, execution_id: DbId) -> oneshot::Receiver<ExecutionOutcome> {
        let (tx, rx) = oneshot::channel();
        let previous = self
            .pending
            .lock()
            .expect("completion signal lock poisoned")
            .insert(execution_id, tx);
        if previous.is_some() {
            tracing::warn!(execution_id, "Replaced an existing completion waiter");
        }
        rx
    }

    /// Deliver the terminal outcome for an execution.
    ///
    /// Exactly one delivery per registration: later calls for the same id
    /// find no waiter and are ignored. Returns whether a waiter was notified.
    pub fn complete(&self, execution_id: DbId, outcome: ExecutionOutcome) -> bool {
        let waiter = self
            .pending
            .lock()
            .expect("completion signal lock poisoned")
            .remove(&execution_id);
        match waiter {
            // A dropped receiver (orchestrator timeout) is not an error.
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter for an execution (orchestrator deadline expired).
    pub fn forget(&self, execution_id: DbId) {
        self.pending
            .lock()
            .expect("completion signal lock poisoned")
            .remove(&execution_id);
    }

    /// Number of registrations still waiting.
    pub fn waiting(&self) -> usize {
        self.pending
            .lock()
            .expect("completion signal lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outcome_reaches_the_registered_waiter() {
        let signals = CompletionSignals::new();
        let rx = signals.register(1);

        assert!(signals.complete(1, ExecutionOutcome::completed(serde_json::json!({"a": 1}))));

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.status, "completed");
        assert_eq!(outcome.output.unwrap()["a"], 1);
    }

    #[tokio::test]
    async fn second_completion_is_a_no_op() {
        let signals = CompletionSignals::new();
        let rx = signals.register(1);

        assert!(signals.complete(1, ExecutionOutcome::failed("boom")));
        assert!(!signals.complete(1, ExecutionOutcome::completed(serde_json::json!({}))));

        assert_eq!(rx.await.unwrap().status, "failed");
    }

    #[test]
    fn completion_without_registration_is_ignored() {
        let signals = CompletionSignals::new();
        assert!(!signals.complete(99, ExecutionOutcome::cancelled()));
    }

    #[tokio::test]
    async fn forget_drops_the_waiter() {
        let signals = CompletionSignals::new();
        let rx = signals.register(1);
        signals.forget(1);

        assert_eq!(signals.waiting(), 0);
        assert!(!signals.complete(1, ExecutionOutcome::cancelled()));
        assert!(rx.await.is_err(), "sender side is gone");
    }

    #[tokio::test]
    async fn completion_after_receiver_dropped_does_not_panic() {
        let signals = CompletionSignals::new();
        let rx = signals.register(1);
        drop(rx);

        // The waiter exists but cannot receive; this must be a quiet no-op.
        assert!(!signals.complete(1, ExecutionOutcome::cancelled()));
    }
}
