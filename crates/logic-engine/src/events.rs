//! Run lifecycle events
//!
//! The engine announces when a node starts and finishes executing so an
//! observing UI can show activity. Events are fire-and-forget signals with
//! no data contract beyond the node and run ids.

use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Trait for receiving run events
///
/// Abstracts over the transport (UI channel, mpsc, test buffer) so the
/// engine stays host-agnostic.
pub trait RunEventSink: Send + Sync {
    /// Deliver an event
    ///
    /// Returns an error if the event could not be delivered (e.g. channel
    /// closed); the engine ignores delivery failures.
    fn send(&self, event: RunEvent) -> Result<(), EventError>;
}

/// Error when event delivery fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    /// A node began executing
    #[serde(rename_all = "camelCase")]
    NodeRunStart { node_id: NodeId, run_id: String },

    /// A node finished executing (successfully or with a captured failure)
    #[serde(rename_all = "camelCase")]
    NodeRunEnd { node_id: NodeId, run_id: String },
}

/// An event sink that discards all events
pub struct NullEventSink;

impl RunEventSink for NullEventSink {
    fn send(&self, _event: RunEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// An event sink that collects events, for tests
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<RunEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// All collected events
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Discard collected events
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RunEventSink for VecEventSink {
    fn send(&self, event: RunEvent) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
