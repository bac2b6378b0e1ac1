use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use escr_core::EventId;

use crate::metadata::EventMetadata;
use crate::stream::{SequenceNumber, StreamName};

/// Envelope for a committed event: payload plus its place in the log.
///
/// Notes:
/// - `sequence_number` is the **global** position, strictly increasing across all streams.
/// - `version` is the position inside `stream_name` (1-based).
/// - Envelopes are immutable once committed; the `with_*` builders are only
///   used while an event store materialises them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,
    event_type: String,

    stream_name: StreamName,
    version: u64,

    sequence_number: SequenceNumber,
    recorded_at: DateTime<Utc>,

    metadata: EventMetadata,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(event_id: EventId, event_type: impl Into<String>, payload: E) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            stream_name: StreamName::new(""),
            version: 0,
            sequence_number: SequenceNumber::none(),
            recorded_at: Utc::now(),
            metadata: EventMetadata::default(),
            payload,
        }
    }

    pub fn in_stream(mut self, stream_name: StreamName, version: u64) -> Self {
        self.stream_name = stream_name;
        self.version = version;
        self
    }

    pub fn at_sequence(mut self, sequence_number: SequenceNumber) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn stream_name(&self) -> &StreamName {
        &self.stream_name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    pub fn recorded(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Swap the payload, keeping every position and metadata field.
    pub fn map_payload<T>(self, f: impl FnOnce(E) -> T) -> EventEnvelope<T> {
        EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type,
            stream_name: self.stream_name,
            version: self.version,
            sequence_number: self.sequence_number,
            recorded_at: self.recorded_at,
            metadata: self.metadata,
            payload: f(self.payload),
        }
    }

    pub fn try_map_payload<T, Err>(
        self,
        f: impl FnOnce(E) -> Result<T, Err>,
    ) -> Result<EventEnvelope<T>, Err> {
        let EventEnvelope {
            event_id,
            event_type,
            stream_name,
            version,
            sequence_number,
            recorded_at,
            metadata,
            payload,
        } = self;
        Ok(EventEnvelope {
            event_id,
            event_type,
            stream_name,
            version,
            sequence_number,
            recorded_at,
            metadata,
            payload: f(payload)?,
        })
    }
}
