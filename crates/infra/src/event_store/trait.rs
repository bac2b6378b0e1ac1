use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use escr_core::{EventId, ExpectedVersion};
use escr_events::{Event, EventEnvelope, EventMetadata, ProjectionStatus, SequenceNumber, StreamName};

/// An event ready to be committed (no stream position yet).
///
/// ## Event Lifecycle
///
/// 1. **Domain event**: decided by a command handler
/// 2. **UncommittedEvent**: serialized payload plus metadata (correlation, recorded command)
/// 3. **StoredEvent**: persisted with a stream version and a global sequence number
/// 4. **EventEnvelope**: deserialized again for projections
///
/// Build one with [`UncommittedEvent::from_typed`]; the event store assigns
/// positions during [`EventStore::commit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub payload: JsonValue,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl UncommittedEvent {
    /// Serialize a typed event, keeping its type name for deserialization.
    pub fn from_typed<E>(event_id: EventId, event: &E, metadata: EventMetadata) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::Serialization(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            event_type: event.event_type().to_string(),
            payload,
            metadata,
        })
    }
}

/// A committed event.
///
/// ## Positions
///
/// - `version`: 1-based position inside `stream_name`; the stream version
///   after a commit is the version of its last event.
/// - `sequence_number`: global position across every stream, strictly
///   increasing in commit order. Subscriptions track this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub stream_name: StreamName,
    pub version: u64,
    pub sequence_number: SequenceNumber,
    pub event_type: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: EventMetadata,
    pub payload: JsonValue,
}

impl StoredEvent {
    /// Raw envelope with the JSON payload; see `EventNormalizer` for typed ones.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(self.event_id, self.event_type.clone(), self.payload.clone())
            .in_stream(self.stream_name.clone(), self.version)
            .at_sequence(self.sequence_number)
            .recorded_at(self.recorded_at)
            .with_metadata(self.metadata.clone())
    }
}

/// Stream version and global position after a successful commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub version: u64,
    pub sequence_number: SequenceNumber,
}

/// Which streams to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStreamSelector {
    /// The global log, every stream interleaved in sequence order.
    All,
    Stream(StreamName),
}

/// Narrows a load. Sequence bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStreamFilter {
    /// Empty means every type.
    pub event_types: BTreeSet<String>,
    pub min_sequence_number: Option<SequenceNumber>,
    pub max_sequence_number: Option<SequenceNumber>,
}

impl EventStreamFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sequence_number(mut self, min: SequenceNumber) -> Self {
        self.min_sequence_number = Some(min);
        self
    }

    pub fn until_sequence_number(mut self, max: Option<SequenceNumber>) -> Self {
        self.max_sequence_number = max;
        self
    }

    pub fn of_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.event_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
            && self.min_sequence_number.is_none_or(|min| event.sequence_number >= min)
            && self.max_sequence_number.is_none_or(|max| event.sequence_number <= max)
    }
}

/// Event store operation error.
///
/// These are **infrastructure errors** as opposed to domain errors:
///
/// - **Concurrency**: the stream moved past the expected version
/// - **InvalidAppend**: the batch itself is unusable
/// - **Serialization**: payload or metadata could not be (de)serialized
/// - **Database**: the backend failed
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed on {stream}: expected {expected}, actual {actual:?}")]
    Concurrency {
        stream: StreamName,
        expected: ExpectedVersion,
        /// `None` when the backend only reported a unique violation.
        actual: Option<u64>,
    },

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(String),
}

impl EventStoreError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::Concurrency { .. })
    }
}

/// Append-only event log of one content repository.
///
/// Streams are named (`ContentStream:<id>`, `Workspace:<name>`); every event
/// also gets a global sequence number so subscriptions can follow the whole
/// log in one order.
///
/// ## Commit Semantics
///
/// `commit()`:
/// - checks `expected` against the current stream version
/// - assigns versions `current + 1 ..` and the next global sequence numbers
/// - persists the batch atomically (all or nothing)
///
/// A racing writer on the same stream makes exactly one of two commits with
/// the same expectation fail with [`EventStoreError::Concurrency`].
///
/// ## Load Semantics
///
/// `load()` returns events in ascending sequence order. Unknown streams load
/// as empty.
pub trait EventStore: Send + Sync {
    /// Provision storage. Idempotent.
    fn setup(&self) -> Result<(), EventStoreError>;

    fn commit(
        &self,
        stream: &StreamName,
        events: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<CommitResult, EventStoreError>;

    fn load(
        &self,
        selector: &EventStreamSelector,
        filter: &EventStreamFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Highest committed sequence number, `none()` for an empty log.
    fn highest_sequence_number(&self) -> Result<SequenceNumber, EventStoreError>;

    /// Current version of a stream, 0 if it does not exist.
    fn stream_version(&self, stream: &StreamName) -> Result<u64, EventStoreError>;

    fn status(&self) -> ProjectionStatus;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn setup(&self) -> Result<(), EventStoreError> {
        (**self).setup()
    }

    fn commit(
        &self,
        stream: &StreamName,
        events: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<CommitResult, EventStoreError> {
        (**self).commit(stream, events, expected)
    }

    fn load(
        &self,
        selector: &EventStreamSelector,
        filter: &EventStreamFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load(selector, filter)
    }

    fn highest_sequence_number(&self) -> Result<SequenceNumber, EventStoreError> {
        (**self).highest_sequence_number()
    }

    fn stream_version(&self, stream: &StreamName) -> Result<u64, EventStoreError> {
        (**self).stream_version(stream)
    }

    fn status(&self) -> ProjectionStatus {
        (**self).status()
    }
}
