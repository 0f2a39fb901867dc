//! Lifecycle event publishing.
//!
//! The orchestrator emits events after the state they describe has been
//! persisted. Emission is fire-and-forget: publishers never block and never
//! report delivery failures back to the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

/// Kinds of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionNew,
    SessionEnd,
    InstanceNew,
    InstanceDelete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::SessionNew => "session_new",
            EventKind::SessionEnd => "session_end",
            EventKind::InstanceNew => "instance_new",
            EventKind::InstanceDelete => "instance_delete",
        };
        f.write_str(name)
    }
}

/// A published lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub session_id: String,
    /// Ordered payload, e.g. `[name, ip, hostname, proxy_host]` for `instance_new`
    pub args: Vec<String>,
    pub emitted_at: DateTime<Utc>,
}

/// Sink for lifecycle events.
pub trait EventPublisher: Send + Sync {
    fn emit(&self, kind: EventKind, session_id: &str, args: Vec<String>);
}

/// Broadcast channel fanning events out to any number of subscribers.
///
/// Events emitted while nobody is subscribed are dropped; slow subscribers
/// observe a lag error and skip ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for EventBus {
    fn emit(&self, kind: EventKind, session_id: &str, args: Vec<String>) {
        let event = Event {
            kind,
            session_id: session_id.to_string(),
            args,
            emitted_at: Utc::now(),
        };
        if self.sender.send(event).is_err() {
            trace!("No subscribers for {} event of session {}", kind, session_id);
        }
    }
}
