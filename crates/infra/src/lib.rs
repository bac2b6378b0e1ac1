//! Infrastructure layer: event storage, command execution, subscriptions,
//! projections and the content repository that wires them together.

pub mod command_bus;
pub mod config;
pub mod content_repository;
pub mod event_store;
pub mod import;
pub mod projections;
pub mod read_model;
pub mod subscription;
pub mod workspace;

pub use command_bus::{CommandBus, CommandError, CommandOutcome, RebaseFailure};
pub use config::ContentRepositoryConfig;
pub use content_repository::{
    ContentRepository, ContentRepositoryBuilder, ContentRepositoryError, ContentRepositoryStatus,
};
pub use import::{EventStoreImporter, ExportedEvent, ImportError};

#[cfg(test)]
pub(crate) mod test_support;
