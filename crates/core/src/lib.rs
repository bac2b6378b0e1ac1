//! `escr-core` — identifiers, errors and concurrency primitives shared by
//! every layer of the content repository.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::{ConfigurationError, DomainError, DomainResult};
pub use id::{
    ContentRepositoryId, ContentStreamId, EventId, NodeAggregateId, NodeName, NodeTypeName,
    SubscriptionId, WorkspaceName,
};
pub use version::ExpectedVersion;
