//! Durable audit capture.
//!
//! [`AuditPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and appends every received [`EngineEvent`] to the
//! `audit_logs` table. It runs as a long-lived background task and shuts
//! down when the bus sender is dropped. Write failures and lag are logged,
//! never propagated: the audit trail must not affect control flow.

use tokio::sync::broadcast;

use flowsync_db::models::CreateAuditLog;
use flowsync_db::repositories::AuditRepo;
use flowsync_db::DbPool;

use crate::bus::EngineEvent;

/// Background service that persists engine events as audit rows.
pub struct AuditPersistence;

impl AuditPersistence {
    /// Run the persistence loop until the event bus closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<EngineEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let entry = CreateAuditLog {
                        event: event.event.clone(),
                        entity_type: event.entity_type.clone(),
                        entity_id: event.entity_id,
                        metadata: event.payload.clone(),
                    };
                    if let Err(e) = AuditRepo::insert(&pool, &entry).await {
                        tracing::error!(
                            error = %e,
                            event = %event.event,
                            "Failed to persist audit entry"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Audit persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, audit persistence shutting down");
                    break;
                }
            }
        }
    }
}
