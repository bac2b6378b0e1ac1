use escr_core::ExpectedVersion;

use crate::stream::StreamName;
use crate::{Command, Event};

/// Events a handler decided on, addressed to one stream.
///
/// Handlers describe *what* should be appended; committing (and with it the
/// expected-version check) is the caller's job.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsToPublish<E> {
    pub stream_name: StreamName,
    pub events: Vec<E>,
    pub expected_version: ExpectedVersion,
}

impl<E> EventsToPublish<E> {
    pub fn new(stream_name: StreamName, events: Vec<E>, expected_version: ExpectedVersion) -> Self {
        Self {
            stream_name,
            events,
            expected_version,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Validates a command against projected state and decides which events to emit.
///
/// Handlers are **pure**: they read through `ReadModel`, perform no IO and never
/// mutate state. State only changes once the emitted events are committed and
/// applied by the projections.
///
/// The error type is associated so each domain can report its own rejections.
pub trait CommandHandler {
    type Cmd: Command;
    type Ev: Event;
    type ReadModel: ?Sized;
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn can_handle(&self, command: &Self::Cmd) -> bool;

    fn handle(
        &self,
        command: &Self::Cmd,
        read_model: &Self::ReadModel,
    ) -> Result<EventsToPublish<Self::Ev>, Self::Error>;
}
