use escr_core::{ContentStreamId, NodeAggregateId, NodeTypeName, WorkspaceName};
use escr_dimension::{DimensionSpacePoint, DimensionSpacePointSet};

use crate::graph::{ContentGraph, NodeAggregate, Workspace};

/// What command handlers may read while deciding.
///
/// Implemented by the in-memory [`ContentGraph`] and by anything that can
/// hand out a consistent view of one (the infrastructure reader locks it per
/// call). All lookups are by content stream; an unknown stream behaves as an
/// empty one.
pub trait ContentGraphReadModel {
    fn find_workspace(&self, name: &WorkspaceName) -> Option<Workspace>;

    fn find_workspaces(&self) -> Vec<Workspace>;

    fn content_stream_version(&self, id: &ContentStreamId) -> Option<u64>;

    fn find_node_aggregate(&self, stream: &ContentStreamId, id: &NodeAggregateId) -> Option<NodeAggregate>;

    fn find_parent_node_aggregates(&self, stream: &ContentStreamId, child: &NodeAggregateId) -> Vec<NodeAggregate>;

    fn find_child_node_aggregates(&self, stream: &ContentStreamId, parent: &NodeAggregateId) -> Vec<NodeAggregate>;

    fn find_root_node_aggregate_by_type(
        &self,
        stream: &ContentStreamId,
        node_type_name: &NodeTypeName,
    ) -> Option<NodeAggregate>;

    fn find_node_aggregates_by_type(&self, stream: &ContentStreamId, node_type_name: &NodeTypeName) -> Vec<NodeAggregate>;

    fn find_parent_node_aggregate_id(
        &self,
        stream: &ContentStreamId,
        child: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Option<NodeAggregateId>;

    fn find_succeeding_sibling_id(
        &self,
        stream: &ContentStreamId,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Option<NodeAggregateId>;

    fn find_child_node_aggregate_ids(
        &self,
        stream: &ContentStreamId,
        parent: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Vec<NodeAggregateId>;

    fn is_ancestor_or_self(
        &self,
        stream: &ContentStreamId,
        ancestor: &NodeAggregateId,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> bool;

    fn used_dimension_space_points(&self, stream: &ContentStreamId) -> DimensionSpacePointSet;
}

impl ContentGraphReadModel for ContentGraph {
    fn find_workspace(&self, name: &WorkspaceName) -> Option<Workspace> {
        self.workspace(name).cloned()
    }

    fn find_workspaces(&self) -> Vec<Workspace> {
        self.workspaces().cloned().collect()
    }

    fn content_stream_version(&self, id: &ContentStreamId) -> Option<u64> {
        ContentGraph::content_stream_version(self, id)
    }

    fn find_node_aggregate(&self, stream: &ContentStreamId, id: &NodeAggregateId) -> Option<NodeAggregate> {
        self.node_aggregate(stream, id)
    }

    fn find_parent_node_aggregates(&self, stream: &ContentStreamId, child: &NodeAggregateId) -> Vec<NodeAggregate> {
        self.content_stream(stream)
            .map(|s| s.parent_node_aggregates(child))
            .unwrap_or_default()
    }

    fn find_child_node_aggregates(&self, stream: &ContentStreamId, parent: &NodeAggregateId) -> Vec<NodeAggregate> {
        self.content_stream(stream)
            .map(|s| s.child_node_aggregates(parent))
            .unwrap_or_default()
    }

    fn find_root_node_aggregate_by_type(
        &self,
        stream: &ContentStreamId,
        node_type_name: &NodeTypeName,
    ) -> Option<NodeAggregate> {
        self.content_stream(stream)
            .and_then(|s| s.root_node_aggregate_by_type(node_type_name))
    }

    fn find_node_aggregates_by_type(&self, stream: &ContentStreamId, node_type_name: &NodeTypeName) -> Vec<NodeAggregate> {
        self.content_stream(stream)
            .map(|s| s.node_aggregates_by_type(node_type_name))
            .unwrap_or_default()
    }

    fn find_parent_node_aggregate_id(
        &self,
        stream: &ContentStreamId,
        child: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Option<NodeAggregateId> {
        self.content_stream(stream)
            .and_then(|s| s.parent_id(child, point))
            .cloned()
    }

    fn find_succeeding_sibling_id(
        &self,
        stream: &ContentStreamId,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Option<NodeAggregateId> {
        self.content_stream(stream)
            .and_then(|s| s.succeeding_sibling_id(id, point))
            .cloned()
    }

    fn find_child_node_aggregate_ids(
        &self,
        stream: &ContentStreamId,
        parent: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Vec<NodeAggregateId> {
        self.content_stream(stream)
            .map(|s| s.child_ids(parent, point).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    fn is_ancestor_or_self(
        &self,
        stream: &ContentStreamId,
        ancestor: &NodeAggregateId,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> bool {
        self.content_stream(stream)
            .is_some_and(|s| s.is_ancestor_or_self(ancestor, id, point))
    }

    fn used_dimension_space_points(&self, stream: &ContentStreamId) -> DimensionSpacePointSet {
        self.content_stream(stream)
            .map(|s| s.used_dimension_space_points())
            .unwrap_or_default()
    }
}
