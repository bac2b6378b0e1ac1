use serde::Serialize;
use serde::de::DeserializeOwned;

use escr_core::EventId;
use escr_events::{Command, Event, EventEnvelope, EventMetadata, RecordedCommand};

use super::r#trait::{EventStoreError, StoredEvent, UncommittedEvent};

/// Converts between typed events and their stored JSON form.
///
/// Both directions go through serde; the stored `event_type` must agree with
/// the payload's own tag, otherwise the row is rejected as corrupt.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize<E>(&self, event: &E, metadata: EventMetadata) -> Result<UncommittedEvent, EventStoreError>
    where
        E: Event + Serialize,
    {
        UncommittedEvent::from_typed(EventId::new(), event, metadata)
    }

    pub fn denormalize<E>(&self, stored: &StoredEvent) -> Result<EventEnvelope<E>, EventStoreError>
    where
        E: Event + DeserializeOwned,
    {
        let payload: E = serde_json::from_value(stored.payload.clone()).map_err(|e| {
            EventStoreError::Serialization(format!(
                "event {} ({}) could not be deserialized: {e}",
                stored.sequence_number, stored.event_type
            ))
        })?;
        if payload.event_type() != stored.event_type {
            return Err(EventStoreError::Serialization(format!(
                "event {} is stored as {} but its payload is {}",
                stored.sequence_number,
                stored.event_type,
                payload.event_type()
            )));
        }
        Ok(EventEnvelope::new(stored.event_id, stored.event_type.clone(), payload)
            .in_stream(stored.stream_name.clone(), stored.version)
            .at_sequence(stored.sequence_number)
            .recorded_at(stored.recorded_at)
            .with_metadata(stored.metadata.clone()))
    }

    pub fn record_command<C>(&self, command: &C) -> Result<RecordedCommand, EventStoreError>
    where
        C: Command + Serialize,
    {
        let payload = serde_json::to_value(command)
            .map_err(|e| EventStoreError::Serialization(format!("command serialization failed: {e}")))?;
        Ok(RecordedCommand {
            command_type: command.command_type().to_string(),
            payload,
        })
    }

    /// The command recorded on a stored event, if any.
    pub fn recorded_command<C>(&self, stored: &StoredEvent) -> Result<Option<C>, EventStoreError>
    where
        C: Command + DeserializeOwned,
    {
        stored
            .metadata
            .command
            .as_ref()
            .map(|recorded| {
                serde_json::from_value(recorded.payload.clone()).map_err(|e| {
                    EventStoreError::Serialization(format!(
                        "recorded {} on event {} could not be deserialized: {e}",
                        recorded.command_type, stored.sequence_number
                    ))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use escr_content::ContentEvent;
    use escr_content::commands::{ContentCommand, DiscardWorkspace};
    use escr_content::events::ContentStreamWasCreated;
    use escr_core::{ContentStreamId, WorkspaceName};
    use escr_events::{SequenceNumber, StreamName};

    use super::*;

    fn stored(uncommitted: UncommittedEvent) -> StoredEvent {
        StoredEvent {
            event_id: uncommitted.event_id,
            stream_name: StreamName::new("ContentStream:cs"),
            version: 1,
            sequence_number: SequenceNumber::new(7),
            event_type: uncommitted.event_type,
            recorded_at: Utc::now(),
            metadata: uncommitted.metadata,
            payload: uncommitted.payload,
        }
    }

    #[test]
    fn stored_events_come_back_typed_with_their_position() {
        let normalizer = EventNormalizer::new();
        let event = ContentEvent::ContentStreamWasCreated(ContentStreamWasCreated {
            content_stream_id: ContentStreamId::new("cs").unwrap(),
        });
        let command = ContentCommand::DiscardWorkspace(DiscardWorkspace {
            workspace_name: WorkspaceName::new("user-a").unwrap(),
            new_content_stream_id: ContentStreamId::new("cs").unwrap(),
        });
        let metadata = EventMetadata::default().with_command(normalizer.record_command(&command).unwrap());

        let row = stored(normalizer.normalize(&event, metadata).unwrap());
        assert_eq!(row.event_type, "ContentStreamWasCreated");

        let envelope: EventEnvelope<ContentEvent> = normalizer.denormalize(&row).unwrap();
        assert_eq!(envelope.payload(), &event);
        assert_eq!(envelope.sequence_number(), SequenceNumber::new(7));
        assert_eq!(envelope.version(), 1);

        let recorded: Option<ContentCommand> = normalizer.recorded_command(&row).unwrap();
        assert_eq!(recorded, Some(command));
    }

    #[test]
    fn mismatched_type_column_is_rejected() {
        let normalizer = EventNormalizer::new();
        let event = ContentEvent::ContentStreamWasCreated(ContentStreamWasCreated {
            content_stream_id: ContentStreamId::new("cs").unwrap(),
        });
        let mut row = stored(normalizer.normalize(&event, EventMetadata::default()).unwrap());
        row.event_type = "ContentStreamWasRemoved".to_string();

        let result: Result<EventEnvelope<ContentEvent>, _> = normalizer.denormalize(&row);
        assert!(matches!(result, Err(EventStoreError::Serialization(_))));
    }
}
