//! Precondition checks shared by the command handlers.
//!
//! Every check turns a failed expectation into
//! [`DomainError::ConstraintViolation`]; nothing here emits events.

use escr_core::{
    ConfigurationError, ContentStreamId, DomainError, DomainResult, NodeAggregateId, NodeName,
    NodeTypeName, WorkspaceName,
};
use escr_dimension::{DimensionSpacePoint, DimensionSpacePointSet, InterDimensionalVariationGraph};

use crate::events::{InterdimensionalSibling, InterdimensionalSiblings};
use crate::graph::NodeAggregate;
use crate::node_type::{NodeType, NodeTypeManager};
use crate::property::PropertyValues;
use crate::read_model::ContentGraphReadModel;

pub(crate) fn from_configuration(error: ConfigurationError) -> DomainError {
    DomainError::constraint(error.to_string())
}

/// The workspace's current content stream and its version.
pub(crate) fn require_content_stream(
    read_model: &dyn ContentGraphReadModel,
    workspace: &WorkspaceName,
) -> DomainResult<(ContentStreamId, u64)> {
    let workspace = read_model
        .find_workspace(workspace)
        .ok_or_else(|| DomainError::constraint(format!("workspace '{workspace}' does not exist")))?;
    let stream = workspace.current_content_stream_id;
    let version = read_model.content_stream_version(&stream).ok_or_else(|| {
        DomainError::constraint(format!("content stream '{stream}' of workspace '{}' does not exist", workspace.name))
    })?;
    Ok((stream, version))
}

pub(crate) fn require_point(
    graph: &InterDimensionalVariationGraph,
    point: &DimensionSpacePoint,
) -> DomainResult<()> {
    graph.node_exists(point).map_err(from_configuration)
}

pub(crate) fn require_aggregate(
    read_model: &dyn ContentGraphReadModel,
    stream: &ContentStreamId,
    id: &NodeAggregateId,
) -> DomainResult<NodeAggregate> {
    read_model
        .find_node_aggregate(stream, id)
        .ok_or_else(|| DomainError::constraint(format!("node aggregate '{id}' does not exist")))
}

pub(crate) fn require_aggregate_absent(
    read_model: &dyn ContentGraphReadModel,
    stream: &ContentStreamId,
    id: &NodeAggregateId,
) -> DomainResult<()> {
    match read_model.find_node_aggregate(stream, id) {
        Some(_) => Err(DomainError::constraint(format!("node aggregate '{id}' already exists"))),
        None => Ok(()),
    }
}

pub(crate) fn require_covers(aggregate: &NodeAggregate, point: &DimensionSpacePoint) -> DomainResult<()> {
    if aggregate.covers(point) {
        Ok(())
    } else {
        Err(DomainError::constraint(format!(
            "node aggregate '{}' does not cover dimension space point {point}",
            aggregate.id()
        )))
    }
}

pub(crate) fn require_not_root(aggregate: &NodeAggregate) -> DomainResult<()> {
    if aggregate.is_root() {
        Err(DomainError::constraint(format!(
            "node aggregate '{}' is a root node aggregate",
            aggregate.id()
        )))
    } else {
        Ok(())
    }
}

pub(crate) fn require_node_type<'a>(
    node_types: &'a NodeTypeManager,
    name: &NodeTypeName,
) -> DomainResult<&'a NodeType> {
    node_types
        .get(name)
        .ok_or_else(|| DomainError::constraint(format!("node type '{name}' does not exist")))
}

/// A concrete, non-root type.
pub(crate) fn require_regular_node_type<'a>(
    node_types: &'a NodeTypeManager,
    name: &NodeTypeName,
) -> DomainResult<&'a NodeType> {
    let node_type = require_node_type(node_types, name)?;
    if node_type.is_abstract() {
        return Err(DomainError::constraint(format!("node type '{name}' is abstract")));
    }
    if node_type.is_root() {
        return Err(DomainError::constraint(format!(
            "node type '{name}' is a root node type"
        )));
    }
    Ok(node_type)
}

pub(crate) fn require_child_allowed(
    node_types: &NodeTypeManager,
    parent: &NodeTypeName,
    child: &NodeTypeName,
) -> DomainResult<()> {
    if node_types.allows_child(parent, child) {
        Ok(())
    } else {
        Err(DomainError::constraint(format!(
            "node type '{parent}' does not allow children of type '{child}'"
        )))
    }
}

/// No other child of `parent` carries `name` in any of `points`.
pub(crate) fn require_name_free(
    read_model: &dyn ContentGraphReadModel,
    stream: &ContentStreamId,
    parent: &NodeAggregateId,
    name: &NodeName,
    points: &DimensionSpacePointSet,
    except: Option<&NodeAggregateId>,
) -> DomainResult<()> {
    let taken = read_model
        .find_child_node_aggregates(stream, parent)
        .into_iter()
        .filter(|child| Some(child.id()) != except)
        .any(|child| child.node_name() == Some(name) && !child.covered().intersection(points).is_empty());
    if taken {
        Err(DomainError::constraint(format!(
            "node name '{name}' is already taken below '{parent}'"
        )))
    } else {
        Ok(())
    }
}

pub(crate) fn require_properties_declared(node_type: &NodeType, values: &PropertyValues) -> DomainResult<()> {
    match values.names().find(|name| !node_type.declares_property(name)) {
        Some(name) => Err(DomainError::constraint(format!(
            "property '{name}' is not declared by node type '{}'",
            node_type.name()
        ))),
        None => Ok(()),
    }
}

/// Place before `requested` wherever it is a child of `parent`, else last.
pub(crate) fn siblings_for(
    read_model: &dyn ContentGraphReadModel,
    stream: &ContentStreamId,
    parent_at: impl Fn(&DimensionSpacePoint) -> Option<NodeAggregateId>,
    requested: Option<&NodeAggregateId>,
    points: &DimensionSpacePointSet,
) -> InterdimensionalSiblings {
    InterdimensionalSiblings::new(
        points
            .iter()
            .map(|point| {
                let parent = parent_at(point);
                let sibling = requested
                    .filter(|s| {
                        parent.is_some()
                            && read_model.find_parent_node_aggregate_id(stream, s, point) == parent
                    })
                    .cloned();
                InterdimensionalSibling {
                    dimension_space_point: point.clone(),
                    node_aggregate_id: sibling,
                }
            })
            .collect(),
    )
}
