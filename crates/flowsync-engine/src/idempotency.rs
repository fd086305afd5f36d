//! TTL-bounded idempotency store for job publication.
//!
//! Keys are `"executionId:nodeId"`. A live entry means the node has already
//! been scheduled for that execution and a second publication is a
//! duplicate. The consumer clears the key before re-enqueueing a retry so
//! the fresh attempt is not rejected as a duplicate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use flowsync_core::types::DbId;

/// Outcome of a check-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyCheck {
    /// First sight: the key is now held by the given step.
    New,
    /// A live entry already exists for this key.
    Duplicate { existing_step_id: DbId },
}

struct Entry {
    step_id: DbId,
    expires_at: Instant,
}

/// In-process dedup map with background expiry.
pub struct IdempotencyStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Build the publication key for an `(execution, node)` pair.
    pub fn key(execution_id: DbId, node_id: &str) -> String {
        format!("{execution_id}:{node_id}")
    }

    /// Claim the key for `step_id`, or report the live holder.
    ///
    /// Expired entries count as absent and are replaced.
    pub fn check_and_set(&self, key: &str, step_id: DbId) -> IdempotencyCheck {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("idempotency lock poisoned");

        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return IdempotencyCheck::Duplicate {
                    existing_step_id: entry.step_id,
                };
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                step_id,
                expires_at: now + self.ttl,
            },
        );
        IdempotencyCheck::New
    }

    /// Release a key so a retry can republish the same node.
    pub fn remove(&self, key: &str) {
        self.entries
            .lock()
            .expect("idempotency lock poisoned")
            .remove(key);
    }

    /// Evict expired entries. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("idempotency lock poisoned");
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of live entries (expired-but-unswept included).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("idempotency lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic sweeper task.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = store.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, "Swept expired idempotency keys");
                        }
                    }
                }
            }
        })
    }
}
