//! Engine event fan-out.
//!
//! Every state transition the engine wants observed — execution lifecycle,
//! trigger firings, dead-letter arrivals — goes through one [`EventBus`].
//! Subscribers (audit capture, the daemon's log ring) each get their own
//! receiver and consume at their own pace; a publisher never waits on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use flowsync_core::types::DbId;

/// How many un-consumed events the channel buffers before slow subscribers
/// start losing the oldest ones (they see `RecvError::Lagged`). Sized for
/// bursts of a few hundred step settlements.
const EVENT_BUFFER: usize = 1024;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// One observable engine occurrence, named dot-style (`"execution.started"`,
/// `"trigger.fired"`, `"dlq.entry"`).
///
/// Build with [`EngineEvent::new`], then chain
/// [`with_entity`](EngineEvent::with_entity) and
/// [`with_payload`](EngineEvent::with_payload) as needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Dot-separated event name.
    pub event: String,

    /// Kind of the entity the event is about, when there is one
    /// (`"execution"`, `"trigger"`, `"step"`).
    pub entity_type: Option<String>,

    /// Database id of that entity.
    pub entity_id: Option<DbId>,

    /// Event-specific JSON details.
    pub payload: serde_json::Value,

    /// Creation instant (UTC).
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    /// Start an event carrying only its name; everything else is optional.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            entity_type: None,
            entity_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Point the event at the entity it concerns.
    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id);
        self
    }

    /// Attach event-specific details.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fire-and-forget publish/subscribe hub, shared as `Arc<EventBus>`.
///
/// Built on `tokio::sync::broadcast`: every subscriber sees every event
/// published after it subscribed. Observability is strictly downstream of
/// the engine, so [`publish`](EventBus::publish) can never fail and never
/// blocks — an event with nobody listening simply evaporates.
pub struct EventBus {
    events: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// A bus with the standard buffer size.
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUFFER)
    }

    /// A bus buffering up to `capacity` un-consumed events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    /// Hand the event to every current subscriber.
    ///
    /// Returns how many receivers it reached; zero is a valid outcome, not
    /// an error, so the broadcast send result is folded into the count.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Open an independent stream of everything published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
