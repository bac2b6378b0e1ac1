//! `escr-events` — envelopes, stream naming and the projection contract.
//!
//! Nothing in here knows about content; the content domain plugs its closed
//! event and command unions into these traits.

pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod metadata;
pub mod projection;
pub mod runner;
pub mod stream;

pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{CommandHandler, EventsToPublish};
pub use metadata::{EventMetadata, RecordedCommand};
pub use projection::{Projection, ProjectionError, ProjectionStatus};
pub use runner::ProjectionRunner;
pub use stream::{SequenceNumber, StreamName};
