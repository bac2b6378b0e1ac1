use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use escr_core::EventId;

/// A command captured alongside the events it produced, so it can be
/// replayed on a different base (rebase, publish).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCommand {
    pub command_type: String,
    pub payload: JsonValue,
}

/// Causation and correlation data carried by every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Shared by all events caused by one external request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// The event this one was directly caused by, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<EventId>,

    /// Set on the first event of a commit produced by a rebaseable command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<RecordedCommand>,
}

impl EventMetadata {
    pub fn correlated(correlation_id: Uuid) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            ..Self::default()
        }
    }

    pub fn with_command(mut self, command: RecordedCommand) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_causation(mut self, causation_id: EventId) -> Self {
        self.causation_id = Some(causation_id);
        self
    }
}
