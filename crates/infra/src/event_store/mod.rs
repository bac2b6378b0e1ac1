//! Append-only event log boundary.
//!
//! Typed events cross into storage through the [`EventNormalizer`]; the
//! stores themselves only see JSON payloads, stream names and positions.

pub mod in_memory;
pub mod normalizer;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use normalizer::EventNormalizer;
pub use postgres::PostgresEventStore;
pub use r#trait::{
    CommitResult, EventStore, EventStoreError, EventStreamFilter, EventStreamSelector, StoredEvent,
    UncommittedEvent,
};
