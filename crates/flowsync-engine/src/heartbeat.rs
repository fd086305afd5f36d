//! In-flight job tracking and stall detection.
//!
//! Workers register a job on dispatch and deregister on any terminal
//! outcome. A job whose last heartbeat is older than the stall threshold is
//! reported in [`HeartbeatMonitor::status`]; detection is observational
//! only, nothing is killed automatically.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use flowsync_core::types::DbId;

struct Inflight {
    execution_id: DbId,
    node_label: String,
    started_at: Instant,
    last_heartbeat: Instant,
}

/// A stalled in-flight job, as reported by [`HeartbeatMonitor::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StalledJob {
    pub job_id: DbId,
    pub execution_id: DbId,
    pub node_label: String,
    pub running_ms: u64,
    pub since_heartbeat_ms: u64,
}

/// Snapshot of the monitor's view of in-flight work.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatStatus {
    pub active: usize,
    pub stalled: Vec<StalledJob>,
}

/// Tracks in-flight jobs and flags the ones that stopped heartbeating.
pub struct HeartbeatMonitor {
    stall_threshold: Duration,
    inflight: Mutex<HashMap<DbId, Inflight>>,
}

impl HeartbeatMonitor {
    pub fn new(stall_threshold: Duration) -> Self {
        Self {
            stall_threshold,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Register a job at dispatch time.
    pub fn register(&self, job_id: DbId, execution_id: DbId, node_label: &str) {
        let now = Instant::now();
        self.inflight.lock().expect("heartbeat lock poisoned").insert(
            job_id,
            Inflight {
                execution_id,
                node_label: node_label.to_string(),
                started_at: now,
                last_heartbeat: now,
            },
        );
    }

    /// Refresh a job's heartbeat.
    pub fn beat(&self, job_id: DbId) {
        if let Some(entry) = self
            .inflight
            .lock()
            .expect("heartbeat lock poisoned")
            .get_mut(&job_id)
        {
            entry.last_heartbeat = Instant::now();
        }
    }

    /// Remove a job on terminal state.
    pub fn deregister(&self, job_id: DbId) {
        self.inflight
            .lock()
            .expect("heartbeat lock poisoned")
            .remove(&job_id);
    }

    /// Report in-flight counts and the stalled subset.
    pub fn status(&self) -> HeartbeatStatus {
        let now = Instant::now();
        let inflight = self.inflight.lock().expect("heartbeat lock poisoned");

        let stalled = inflight
            .iter()
            .filter(|(_, j)| now.duration_since(j.last_heartbeat) > self.stall_threshold)
            .map(|(id, j)| StalledJob {
                job_id: *id,
                execution_id: j.execution_id,
                node_label: j.node_label.clone(),
                running_ms: now.duration_since(j.started_at).as_millis() as u64,
                since_heartbeat_ms: now.duration_since(j.last_heartbeat).as_millis() as u64,
            })
            .collect();

        HeartbeatStatus {
            active: inflight.len(),
            stalled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_job_counts_as_active() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        monitor.register(1, 10, "fetch");

        let status = monitor.status();
        assert_eq!(status.active, 1);
        assert!(status.stalled.is_empty());
    }

    #[test]
    fn deregister_removes_the_job() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        monitor.register(1, 10, "fetch");
        monitor.deregister(1);
        assert_eq!(monitor.status().active, 0);
    }

    #[test]
    fn silent_job_is_reported_stalled() {
        // Zero threshold: any elapsed time counts as a stall.
        let monitor = HeartbeatMonitor::new(Duration::from_millis(0));
        monitor.register(1, 10, "slow-node");

        std::thread::sleep(Duration::from_millis(5));

        let status = monitor.status();
        assert_eq!(status.stalled.len(), 1);
        assert_eq!(status.stalled[0].job_id, 1);
        assert_eq!(status.stalled[0].execution_id, 10);
        assert_eq!(status.stalled[0].node_label, "slow-node");
    }

    #[test]
    fn beat_clears_the_stall() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        monitor.register(1, 10, "fetch");
        monitor.beat(1);
        assert!(monitor.status().stalled.is_empty());
    }

    #[test]
    fn beat_on_unknown_job_is_a_no_op() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        monitor.beat(99);
        assert_eq!(monitor.status().active, 0);
    }
}
