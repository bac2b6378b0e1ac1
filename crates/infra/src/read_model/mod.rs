//! Partitioned storage for disposable read models.

pub mod partitioned_store;

pub use partitioned_store::{InMemoryPartitionedStore, PartitionedStore};
