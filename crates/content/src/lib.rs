//! `escr-content` — the content graph domain.
//!
//! This crate is **pure**: node types, the closed event and command unions,
//! the in-memory content graph with its subgraph queries, and the command
//! handlers that validate commands against it. Persistence, subscriptions and
//! workspace publishing live in `escr-infra`.

pub mod commands;
pub mod events;
pub mod graph;
pub mod handler;
pub mod migration;
pub mod node;
pub mod node_path;
pub mod node_type;
pub mod property;
pub mod read_model;
pub mod simulator;
pub mod subtree_tag;

#[cfg(test)]
pub(crate) mod test_support;

pub use commands::{CommandThatFailed, ContentCommand, RebaseErrorHandlingStrategy};
pub use events::ContentEvent;
pub use graph::{
    ContentGraph, ContentStreamGraph, ContentSubgraph, NodeAggregate, NodeFilter, NodeTypeCriteria,
    VisibilityConstraints, Workspace,
};
pub use handler::{DimensionSpaceCommandHandler, NodeAggregateCommandHandler};
pub use migration::{NodeMigration, NodeMigrationTransformation, PropertyValueChange};
pub use node::{Node, NodeAggregateClassification};
pub use node_path::NodePath;
pub use node_type::{NodeType, NodeTypeConfig, NodeTypeManager};
pub use property::PropertyValues;
pub use read_model::ContentGraphReadModel;
pub use simulator::{CommandSimulator, SimulatedCommit};
pub use subtree_tag::{NodeTags, SubtreeTag};
