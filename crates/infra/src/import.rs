//! Import of exported events (`events.jsonl`) into a fresh root workspace.
//!
//! Each line is one [`ExportedEvent`]. Imported events are rebound onto the
//! target root workspace and its content stream, and committed as a single
//! batch that only an otherwise empty content stream accepts.
//!
//! ```text
//! Workspace:<target> ──RootWorkspaceWasCreated──> content stream id
//! events.jsonl ──parse──> rebind ids ──remap event ids──> typed check
//!              ──commit(ContentStream:<id>, Exact(1))
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use escr_content::ContentEvent;
use escr_core::{ContentStreamId, EventId, ExpectedVersion, WorkspaceName};
use escr_events::{EventMetadata, StreamName};

use crate::event_store::{
    CommitResult, EventNormalizer, EventStore, EventStoreError, EventStreamFilter, EventStreamSelector, StoredEvent,
    UncommittedEvent,
};

/// One line of an event export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedEvent {
    pub identifier: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: JsonValue,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl ExportedEvent {
    pub fn from_stored(stored: &StoredEvent) -> Self {
        Self {
            identifier: stored.event_id,
            event_type: stored.event_type.clone(),
            payload: stored.payload.clone(),
            metadata: stored.metadata.clone(),
        }
    }

    pub fn to_json_line(&self) -> Result<String, ImportError> {
        serde_json::to_string(self).map_err(|e| ImportError::Malformed {
            line: 0,
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("workspace '{0}' does not exist or is not a root workspace")]
    NotARootWorkspace(WorkspaceName),

    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("line {line}: {event_type} is not expected in an imported event stream")]
    UnexpectedEvent { line: usize, event_type: String },

    #[error(
        "cannot import {events} events: content stream '{content_stream_id}' of workspace '{workspace_name}' already contains events"
    )]
    ContentStreamNotEmpty {
        events: usize,
        content_stream_id: ContentStreamId,
        workspace_name: WorkspaceName,
    },

    #[error("failed to read events: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

pub struct EventStoreImporter {
    event_store: Arc<dyn EventStore>,
    target_workspace_name: WorkspaceName,
    keep_event_ids: bool,
    normalizer: EventNormalizer,
}

impl EventStoreImporter {
    pub fn new(event_store: Arc<dyn EventStore>, target_workspace_name: WorkspaceName) -> Self {
        Self {
            event_store,
            target_workspace_name,
            keep_event_ids: false,
            normalizer: EventNormalizer::new(),
        }
    }

    /// Keep the exported event ids instead of generating fresh ones.
    pub fn keep_event_ids(mut self, keep: bool) -> Self {
        self.keep_event_ids = keep;
        self
    }

    #[tracing::instrument(skip(self, reader), fields(workspace = %self.target_workspace_name), err)]
    pub fn import(&self, reader: impl BufRead) -> Result<CommitResult, ImportError> {
        let content_stream_id = self.root_content_stream_id()?;
        let mut event_ids: HashMap<Uuid, EventId> = HashMap::new();
        let mut events = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut exported: ExportedEvent = serde_json::from_str(line.trim()).map_err(|e| ImportError::Malformed {
                line: line_number,
                message: e.to_string(),
            })?;
            self.rebind(&mut exported.payload, &content_stream_id);
            if !self.keep_event_ids {
                remap_event_ids(&mut exported, &mut event_ids);
            }

            let event: ContentEvent = serde_json::from_value(exported.payload).map_err(|e| ImportError::Malformed {
                line: line_number,
                message: format!("{} could not be read: {e}", exported.event_type),
            })?;
            if matches!(
                event,
                ContentEvent::ContentStreamWasCreated(_)
                    | ContentEvent::ContentStreamWasForked(_)
                    | ContentEvent::ContentStreamWasRemoved(_)
            ) {
                return Err(ImportError::UnexpectedEvent {
                    line: line_number,
                    event_type: exported.event_type,
                });
            }
            events.push(UncommittedEvent::from_typed(exported.identifier, &event, exported.metadata)?);
        }

        let count = events.len();
        let stream = StreamName::for_content_stream(&content_stream_id);
        let result = self
            .event_store
            .commit(&stream, events, ExpectedVersion::Exact(1))
            .map_err(|e| match e {
                EventStoreError::Concurrency { .. } => ImportError::ContentStreamNotEmpty {
                    events: count,
                    content_stream_id: content_stream_id.clone(),
                    workspace_name: self.target_workspace_name.clone(),
                },
                other => ImportError::Store(other),
            })?;
        info!(events = count, content_stream = %content_stream_id, "events imported");
        Ok(result)
    }

    fn root_content_stream_id(&self) -> Result<ContentStreamId, ImportError> {
        let stored = self.event_store.load(
            &EventStreamSelector::Stream(StreamName::for_workspace(&self.target_workspace_name)),
            &EventStreamFilter::new().of_types(["RootWorkspaceWasCreated"]),
        )?;
        let Some(first) = stored.first() else {
            return Err(ImportError::NotARootWorkspace(self.target_workspace_name.clone()));
        };
        match self.normalizer.denormalize::<ContentEvent>(first)?.into_payload() {
            ContentEvent::RootWorkspaceWasCreated(created) => Ok(created.new_content_stream_id),
            _ => Err(ImportError::NotARootWorkspace(self.target_workspace_name.clone())),
        }
    }

    /// Point the event at the target workspace and its content stream.
    fn rebind(&self, payload: &mut JsonValue, content_stream_id: &ContentStreamId) {
        let Some(fields) = payload.as_object_mut() else {
            return;
        };
        if let Some(value) = fields.get_mut("content_stream_id") {
            *value = JsonValue::String(content_stream_id.to_string());
        }
        if let Some(value) = fields.get_mut("workspace_name") {
            *value = JsonValue::String(self.target_workspace_name.to_string());
        }
    }
}

/// Fresh id for the event; causation and correlation ids that point at an
/// earlier imported event follow it.
fn remap_event_ids(exported: &mut ExportedEvent, event_ids: &mut HashMap<Uuid, EventId>) {
    let fresh = EventId::new();
    event_ids.insert(*exported.identifier.as_uuid(), fresh);
    exported.identifier = fresh;

    let metadata = &mut exported.metadata;
    if let Some(mapped) = metadata.causation_id.and_then(|id| event_ids.get(id.as_uuid())) {
        metadata.causation_id = Some(*mapped);
    }
    if let Some(mapped) = metadata.correlation_id.and_then(|id| event_ids.get(&id)) {
        metadata.correlation_id = Some(*mapped.as_uuid());
    }
}
