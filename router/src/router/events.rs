//! Router events for real-time visibility
//!
//! Emitted while a user turn is processed. Consumers (the CLI, a log sink)
//! subscribe through an unbounded channel; sending never blocks the loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ============================================================================
// Router Events
// ============================================================================

/// Events emitted by the router during a user turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouterEvent {
    /// A user turn was accepted
    TurnStart {
        message: String,
    },

    /// The model asked for one or more tools
    ToolsRequested {
        names: Vec<String>,
    },

    /// Tool execution is starting
    ToolStart {
        name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed
    ToolComplete {
        name: String,
        /// Tool result, or the error text recorded in its place
        result: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
        is_error: bool,
    },

    /// Final answer ready
    Answered {
        content: String,
        #[serde(with = "duration_millis")]
        total_duration: Duration,
    },

    /// The turn ended without an answer
    Error {
        message: String,
    },
}

/// Serialize Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ============================================================================
// Event Channel
// ============================================================================

/// Sender for router events
pub type EventSender = mpsc::UnboundedSender<RouterEvent>;

/// Receiver for router events
pub type EventReceiver = mpsc::UnboundedReceiver<RouterEvent>;

/// Create a new event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ============================================================================
// Event Sender Helper
// ============================================================================

/// Optional sender with one method per event
#[derive(Clone, Default)]
pub struct RouterEventSender {
    sender: Option<EventSender>,
}

impl RouterEventSender {
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Events are discarded
    pub fn none() -> Self {
        Self { sender: None }
    }

    pub fn is_active(&self) -> bool {
        self.sender.is_some()
    }

    /// Send an event (silently fails if no sender or receiver dropped)
    pub fn send(&self, event: RouterEvent) {
        if let Some(ref sender) = self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn turn_start(&self, message: &str) {
        self.send(RouterEvent::TurnStart {
            message: message.to_string(),
        });
    }

    pub fn tools_requested(&self, names: Vec<String>) {
        self.send(RouterEvent::ToolsRequested { names });
    }

    pub fn tool_start(&self, name: &str, arguments: &serde_json::Value) {
        self.send(RouterEvent::ToolStart {
            name: name.to_string(),
            arguments: arguments.clone(),
        });
    }

    pub fn tool_complete(&self, name: &str, result: &str, duration: Duration, is_error: bool) {
        self.send(RouterEvent::ToolComplete {
            name: name.to_string(),
            result: result.to_string(),
            duration,
            is_error,
        });
    }

    pub fn answered(&self, content: &str, total_duration: Duration) {
        self.send(RouterEvent::Answered {
            content: content.to_string(),
            total_duration,
        });
    }

    pub fn error(&self, message: &str) {
        self.send(RouterEvent::Error {
            message: message.to_string(),
        });
    }
}
