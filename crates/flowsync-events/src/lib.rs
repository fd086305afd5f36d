//! In-process eventing for the FlowSync engine.
//!
//! [`bus::EventBus`] is the publish/subscribe hub for [`bus::EngineEvent`]s;
//! [`completion::CompletionSignals`] delivers the one-shot terminal-state
//! notification each awaiting orchestrator call depends on; and
//! [`audit::AuditPersistence`] drains the bus into the `audit_logs` table.

pub mod audit;
pub mod bus;
pub mod completion;

pub use audit::AuditPersistence;
pub use bus::{EngineEvent, EventBus};
pub use completion::{CompletionSignals, ExecutionOutcome};
