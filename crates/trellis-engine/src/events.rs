//! Engine event system.
//!
//! Emits [`EngineEvent`]s via a [`tokio::sync::broadcast`] channel so the
//! host's rendering collaborator can batch UI updates without coupling to
//! engine internals. Each event fires at most once per cycle per distinct
//! changed value; visibility events additionally fire when interaction-flag
//! changes alter the visible subset without a validation cycle.

use serde::{Deserialize, Serialize};

use trellis_types::{FeedbackEntry, ValidationStates};

/// Change notifications emitted by the validation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A validation cycle ran its synchronous portion.
    ValidatePerformed { cycle: u64 },
    /// The per-type validation state was rebuilt with a different outcome.
    ValidationStatesChanged { states: ValidationStates },
    /// The set of types with at least one active entry changed.
    HasFeedbackForChanged { types: Vec<String> },
    /// The visible subset changed (cycle finalization or flag change).
    ShowsFeedbackForChanged { types: Vec<String> },
    /// The resolved feedback entries changed.
    FeedbackChanged { entries: Vec<FeedbackEntry> },
    /// Asynchronous validators started or finished settling.
    IsPendingChanged { pending: bool },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
