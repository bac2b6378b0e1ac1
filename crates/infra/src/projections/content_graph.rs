//! The primary projection: the full content graph of every content stream.
//!
//! ```text
//! SubscriptionEngine ──apply──> ContentGraphProjection ──write lock──┐
//!                                                                    ▼
//!                                                   Arc<RwLock<ContentGraph>>
//!                                                                    ▲
//! CommandBus / queries ──────> ContentGraphReader ───read lock───────┘
//! ```
//!
//! The projection owns the only writer. Readers lock per call, so a command
//! handler that issues several lookups may observe a catch-up between two of
//! them; the expected-version check on commit rejects decisions based on such
//! a torn view.

use std::sync::{Arc, PoisonError, RwLock};

use escr_content::{ContentEvent, ContentGraph, ContentGraphReadModel, NodeAggregate, Workspace};
use escr_core::{ContentStreamId, NodeAggregateId, NodeTypeName, WorkspaceName};
use escr_dimension::{DimensionSpacePoint, DimensionSpacePointSet};
use escr_events::{EventEnvelope, Projection, ProjectionError};

#[derive(Debug, Default)]
pub struct ContentGraphProjection {
    graph: Arc<RwLock<ContentGraph>>,
}

impl ContentGraphProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that sees every event this projection applies.
    pub fn reader(&self) -> ContentGraphReader {
        ContentGraphReader {
            graph: self.graph.clone(),
        }
    }
}

impl Projection for ContentGraphProjection {
    type Ev = ContentEvent;

    fn reset(&mut self) -> Result<(), ProjectionError> {
        let mut graph = self
            .graph
            .write()
            .map_err(|_| ProjectionError::apply("content graph lock poisoned"))?;
        graph.clear();
        Ok(())
    }

    fn apply(&mut self, envelope: &EventEnvelope<ContentEvent>) -> Result<(), ProjectionError> {
        let mut graph = self
            .graph
            .write()
            .map_err(|_| ProjectionError::apply("content graph lock poisoned"))?;
        Projection::apply(&mut *graph, envelope)
    }
}

/// Shared read access to the projected content graph.
#[derive(Debug, Clone)]
pub struct ContentGraphReader {
    graph: Arc<RwLock<ContentGraph>>,
}

impl ContentGraphReader {
    /// Run `f` against a consistent view of the graph.
    ///
    /// A writer that panicked mid-apply leaves the graph as it was at that
    /// point; reads still go through.
    pub fn read<R>(&self, f: impl FnOnce(&ContentGraph) -> R) -> R {
        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        f(&graph)
    }

    /// A detached copy of the current graph, e.g. as the base of a simulation.
    pub fn snapshot(&self) -> ContentGraph {
        self.read(ContentGraph::clone)
    }
}

impl ContentGraphReadModel for ContentGraphReader {
    fn find_workspace(&self, name: &WorkspaceName) -> Option<Workspace> {
        self.read(|g| g.find_workspace(name))
    }

    fn find_workspaces(&self) -> Vec<Workspace> {
        self.read(|g| g.find_workspaces())
    }

    fn content_stream_version(&self, id: &ContentStreamId) -> Option<u64> {
        self.read(|g| g.content_stream_version(id))
    }

    fn find_node_aggregate(&self, stream: &ContentStreamId, id: &NodeAggregateId) -> Option<NodeAggregate> {
        self.read(|g| g.find_node_aggregate(stream, id))
    }

    fn find_parent_node_aggregates(&self, stream: &ContentStreamId, child: &NodeAggregateId) -> Vec<NodeAggregate> {
        self.read(|g| g.find_parent_node_aggregates(stream, child))
    }

    fn find_child_node_aggregates(&self, stream: &ContentStreamId, parent: &NodeAggregateId) -> Vec<NodeAggregate> {
        self.read(|g| g.find_child_node_aggregates(stream, parent))
    }

    fn find_root_node_aggregate_by_type(
        &self,
        stream: &ContentStreamId,
        node_type_name: &NodeTypeName,
    ) -> Option<NodeAggregate> {
        self.read(|g| g.find_root_node_aggregate_by_type(stream, node_type_name))
    }

    fn find_node_aggregates_by_type(&self, stream: &ContentStreamId, node_type_name: &NodeTypeName) -> Vec<NodeAggregate> {
        self.read(|g| g.find_node_aggregates_by_type(stream, node_type_name))
    }

    fn find_parent_node_aggregate_id(
        &self,
        stream: &ContentStreamId,
        child: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Option<NodeAggregateId> {
        self.read(|g| g.find_parent_node_aggregate_id(stream, child, point))
    }

    fn find_succeeding_sibling_id(
        &self,
        stream: &ContentStreamId,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Option<NodeAggregateId> {
        self.read(|g| g.find_succeeding_sibling_id(stream, id, point))
    }

    fn find_child_node_aggregate_ids(
        &self,
        stream: &ContentStreamId,
        parent: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Vec<NodeAggregateId> {
        self.read(|g| g.find_child_node_aggregate_ids(stream, parent, point))
    }

    fn is_ancestor_or_self(
        &self,
        stream: &ContentStreamId,
        ancestor: &NodeAggregateId,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> bool {
        self.read(|g| g.is_ancestor_or_self(stream, ancestor, id, point))
    }

    fn used_dimension_space_points(&self, stream: &ContentStreamId) -> DimensionSpacePointSet {
        self.read(|g| g.used_dimension_space_points(stream))
    }
}
