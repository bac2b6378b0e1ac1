//! The closed set of content repository events.
//!
//! Every event is a plain struct; [`ContentEvent`] is the tagged union that is
//! persisted (the `type` field carries the variant name). Projections match on
//! it exhaustively, so a new event only compiles once every projection decides
//! what to do with it.

use serde::{Deserialize, Serialize};

use escr_core::{ContentStreamId, NodeAggregateId, NodeName, NodeTypeName, WorkspaceName};
use escr_dimension::{
    DimensionSpacePoint, DimensionSpacePointSet, OriginDimensionSpacePoint,
    OriginDimensionSpacePointSet,
};
use escr_events::Event;

use crate::commands::CommandThatFailed;
use crate::node::NodeAggregateClassification;
use crate::property::PropertyValues;
use crate::subtree_tag::SubtreeTag;

/// Where a node goes in one covered point: before `node_aggregate_id`, or last if `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterdimensionalSibling {
    pub dimension_space_point: DimensionSpacePoint,
    pub node_aggregate_id: Option<NodeAggregateId>,
}

/// Per covered point sibling placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterdimensionalSiblings(Vec<InterdimensionalSibling>);

impl InterdimensionalSiblings {
    pub fn new(siblings: Vec<InterdimensionalSibling>) -> Self {
        Self(siblings)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterdimensionalSibling> {
        self.0.iter()
    }

    pub fn points(&self) -> DimensionSpacePointSet {
        self.0.iter().map(|s| s.dimension_space_point.clone()).collect()
    }

    pub fn sibling_at(&self, point: &DimensionSpacePoint) -> Option<&NodeAggregateId> {
        self.0
            .iter()
            .find(|s| &s.dimension_space_point == point)
            .and_then(|s| s.node_aggregate_id.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// --- workspace lifecycle ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootWorkspaceWasCreated {
    pub workspace_name: WorkspaceName,
    pub new_content_stream_id: ContentStreamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceWasCreated {
    pub workspace_name: WorkspaceName,
    pub base_workspace_name: WorkspaceName,
    pub new_content_stream_id: ContentStreamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceWasPublished {
    pub source_workspace_name: WorkspaceName,
    pub target_workspace_name: WorkspaceName,
    pub new_source_content_stream_id: ContentStreamId,
    pub previous_source_content_stream_id: ContentStreamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceWasRebased {
    pub workspace_name: WorkspaceName,
    pub new_content_stream_id: ContentStreamId,
    pub previous_content_stream_id: ContentStreamId,
    /// Commands dropped by a forced rebase.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_commands: Vec<CommandThatFailed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceWasDiscarded {
    pub workspace_name: WorkspaceName,
    pub new_content_stream_id: ContentStreamId,
    pub previous_content_stream_id: ContentStreamId,
}

// --- content stream lifecycle ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStreamWasCreated {
    pub content_stream_id: ContentStreamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStreamWasForked {
    pub new_content_stream_id: ContentStreamId,
    pub source_content_stream_id: ContentStreamId,
    pub version_of_source: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStreamWasRemoved {
    pub content_stream_id: ContentStreamId,
}

// --- node aggregates ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootNodeAggregateWithNodeWasCreated {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub node_type_name: NodeTypeName,
    pub covered_dimension_space_points: DimensionSpacePointSet,
    pub node_aggregate_classification: NodeAggregateClassification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootNodeAggregateDimensionsWereUpdated {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub covered_dimension_space_points: DimensionSpacePointSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAggregateWithNodeWasCreated {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub node_type_name: NodeTypeName,
    pub origin_dimension_space_point: OriginDimensionSpacePoint,
    /// Covered points, each with the sibling the node is inserted before.
    pub succeeding_siblings_for_coverage: InterdimensionalSiblings,
    pub parent_node_aggregate_id: NodeAggregateId,
    pub node_name: Option<NodeName>,
    #[serde(default)]
    pub initial_property_values: PropertyValues,
    pub node_aggregate_classification: NodeAggregateClassification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePropertiesWereSet {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub origin_dimension_space_point: OriginDimensionSpacePoint,
    pub affected_dimension_space_points: DimensionSpacePointSet,
    pub property_values: PropertyValues,
    #[serde(default)]
    pub properties_to_unset: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAggregateWasMoved {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    /// `None` keeps the current parent in every point.
    pub new_parent_node_aggregate_id: Option<NodeAggregateId>,
    pub succeeding_siblings_for_coverage: InterdimensionalSiblings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAggregateNameWasChanged {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub new_node_name: NodeName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAggregateTypeWasChanged {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub new_node_type_name: NodeTypeName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpecializationVariantWasCreated {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub source_origin: OriginDimensionSpacePoint,
    pub specialization_origin: OriginDimensionSpacePoint,
    pub specialization_siblings: InterdimensionalSiblings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGeneralizationVariantWasCreated {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub source_origin: OriginDimensionSpacePoint,
    pub generalization_origin: OriginDimensionSpacePoint,
    pub variant_succeeding_siblings: InterdimensionalSiblings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePeerVariantWasCreated {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub source_origin: OriginDimensionSpacePoint,
    pub peer_origin: OriginDimensionSpacePoint,
    pub peer_succeeding_siblings: InterdimensionalSiblings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeWasTagged {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub affected_dimension_space_points: DimensionSpacePointSet,
    pub tag: SubtreeTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeWasUntagged {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub affected_dimension_space_points: DimensionSpacePointSet,
    pub tag: SubtreeTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAggregateWasRemoved {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub node_aggregate_id: NodeAggregateId,
    pub affected_occupied_dimension_space_points: OriginDimensionSpacePointSet,
    pub affected_covered_dimension_space_points: DimensionSpacePointSet,
}

// --- dimension space evolution ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSpacePointWasMoved {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub source: DimensionSpacePoint,
    pub target: DimensionSpacePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionShineThroughWasAdded {
    pub workspace_name: WorkspaceName,
    pub content_stream_id: ContentStreamId,
    pub source: DimensionSpacePoint,
    pub target: DimensionSpacePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentEvent {
    RootWorkspaceWasCreated(RootWorkspaceWasCreated),
    WorkspaceWasCreated(WorkspaceWasCreated),
    WorkspaceWasPublished(WorkspaceWasPublished),
    WorkspaceWasRebased(WorkspaceWasRebased),
    WorkspaceWasDiscarded(WorkspaceWasDiscarded),
    ContentStreamWasCreated(ContentStreamWasCreated),
    ContentStreamWasForked(ContentStreamWasForked),
    ContentStreamWasRemoved(ContentStreamWasRemoved),
    RootNodeAggregateWithNodeWasCreated(RootNodeAggregateWithNodeWasCreated),
    RootNodeAggregateDimensionsWereUpdated(RootNodeAggregateDimensionsWereUpdated),
    NodeAggregateWithNodeWasCreated(NodeAggregateWithNodeWasCreated),
    NodePropertiesWereSet(NodePropertiesWereSet),
    NodeAggregateWasMoved(NodeAggregateWasMoved),
    NodeAggregateNameWasChanged(NodeAggregateNameWasChanged),
    NodeAggregateTypeWasChanged(NodeAggregateTypeWasChanged),
    NodeSpecializationVariantWasCreated(NodeSpecializationVariantWasCreated),
    NodeGeneralizationVariantWasCreated(NodeGeneralizationVariantWasCreated),
    NodePeerVariantWasCreated(NodePeerVariantWasCreated),
    SubtreeWasTagged(SubtreeWasTagged),
    SubtreeWasUntagged(SubtreeWasUntagged),
    NodeAggregateWasRemoved(NodeAggregateWasRemoved),
    DimensionSpacePointWasMoved(DimensionSpacePointWasMoved),
    DimensionShineThroughWasAdded(DimensionShineThroughWasAdded),
}

/// The three variant creation events viewed through one shape.
#[derive(Debug, Clone, Copy)]
pub struct NodeVariantCreation<'a> {
    pub content_stream_id: &'a ContentStreamId,
    pub node_aggregate_id: &'a NodeAggregateId,
    pub source_origin: &'a OriginDimensionSpacePoint,
    pub target_origin: &'a OriginDimensionSpacePoint,
    pub siblings: &'a InterdimensionalSiblings,
}

macro_rules! node_event_fields {
    ($value:expr, $e:ident => $body:expr, else $other:expr) => {
        match $value {
            ContentEvent::RootNodeAggregateWithNodeWasCreated($e) => $body,
            ContentEvent::RootNodeAggregateDimensionsWereUpdated($e) => $body,
            ContentEvent::NodeAggregateWithNodeWasCreated($e) => $body,
            ContentEvent::NodePropertiesWereSet($e) => $body,
            ContentEvent::NodeAggregateWasMoved($e) => $body,
            ContentEvent::NodeAggregateNameWasChanged($e) => $body,
            ContentEvent::NodeAggregateTypeWasChanged($e) => $body,
            ContentEvent::NodeSpecializationVariantWasCreated($e) => $body,
            ContentEvent::NodeGeneralizationVariantWasCreated($e) => $body,
            ContentEvent::NodePeerVariantWasCreated($e) => $body,
            ContentEvent::SubtreeWasTagged($e) => $body,
            ContentEvent::SubtreeWasUntagged($e) => $body,
            ContentEvent::NodeAggregateWasRemoved($e) => $body,
            ContentEvent::DimensionSpacePointWasMoved($e) => $body,
            ContentEvent::DimensionShineThroughWasAdded($e) => $body,
            _ => $other,
        }
    };
}

impl ContentEvent {
    /// The content stream whose event stream this event belongs to.
    ///
    /// Workspace lifecycle events live in workspace streams and return `None`.
    pub fn content_stream_id(&self) -> Option<&ContentStreamId> {
        match self {
            ContentEvent::ContentStreamWasCreated(e) => Some(&e.content_stream_id),
            ContentEvent::ContentStreamWasForked(e) => Some(&e.new_content_stream_id),
            ContentEvent::ContentStreamWasRemoved(e) => Some(&e.content_stream_id),
            other => node_event_fields!(other, e => Some(&e.content_stream_id), else None),
        }
    }

    /// Workspace a node event was issued in.
    pub fn workspace_name(&self) -> Option<&WorkspaceName> {
        node_event_fields!(self, e => Some(&e.workspace_name), else None)
    }

    /// Point a node event at another workspace and content stream.
    ///
    /// Used when importing events into a fresh repository. Returns `false` for
    /// events that are not node events.
    pub fn rebind(&mut self, workspace_name: &WorkspaceName, content_stream_id: &ContentStreamId) -> bool {
        node_event_fields!(self, e => {
            e.workspace_name = workspace_name.clone();
            e.content_stream_id = content_stream_id.clone();
            true
        }, else false)
    }

    /// Whether the event manages streams rather than content.
    pub fn is_content_stream_lifecycle(&self) -> bool {
        matches!(
            self,
            ContentEvent::ContentStreamWasCreated(_)
                | ContentEvent::ContentStreamWasForked(_)
                | ContentEvent::ContentStreamWasRemoved(_)
        )
    }

    pub fn as_node_variant_creation(&self) -> Option<NodeVariantCreation<'_>> {
        match self {
            ContentEvent::NodeSpecializationVariantWasCreated(e) => Some(NodeVariantCreation {
                content_stream_id: &e.content_stream_id,
                node_aggregate_id: &e.node_aggregate_id,
                source_origin: &e.source_origin,
                target_origin: &e.specialization_origin,
                siblings: &e.specialization_siblings,
            }),
            ContentEvent::NodeGeneralizationVariantWasCreated(e) => Some(NodeVariantCreation {
                content_stream_id: &e.content_stream_id,
                node_aggregate_id: &e.node_aggregate_id,
                source_origin: &e.source_origin,
                target_origin: &e.generalization_origin,
                siblings: &e.variant_succeeding_siblings,
            }),
            ContentEvent::NodePeerVariantWasCreated(e) => Some(NodeVariantCreation {
                content_stream_id: &e.content_stream_id,
                node_aggregate_id: &e.node_aggregate_id,
                source_origin: &e.source_origin,
                target_origin: &e.peer_origin,
                siblings: &e.peer_succeeding_siblings,
            }),
            _ => None,
        }
    }
}

impl Event for ContentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ContentEvent::RootWorkspaceWasCreated(_) => "RootWorkspaceWasCreated",
            ContentEvent::WorkspaceWasCreated(_) => "WorkspaceWasCreated",
            ContentEvent::WorkspaceWasPublished(_) => "WorkspaceWasPublished",
            ContentEvent::WorkspaceWasRebased(_) => "WorkspaceWasRebased",
            ContentEvent::WorkspaceWasDiscarded(_) => "WorkspaceWasDiscarded",
            ContentEvent::ContentStreamWasCreated(_) => "ContentStreamWasCreated",
            ContentEvent::ContentStreamWasForked(_) => "ContentStreamWasForked",
            ContentEvent::ContentStreamWasRemoved(_) => "ContentStreamWasRemoved",
            ContentEvent::RootNodeAggregateWithNodeWasCreated(_) => {
                "RootNodeAggregateWithNodeWasCreated"
            }
            ContentEvent::RootNodeAggregateDimensionsWereUpdated(_) => {
                "RootNodeAggregateDimensionsWereUpdated"
            }
            ContentEvent::NodeAggregateWithNodeWasCreated(_) => "NodeAggregateWithNodeWasCreated",
            ContentEvent::NodePropertiesWereSet(_) => "NodePropertiesWereSet",
            ContentEvent::NodeAggregateWasMoved(_) => "NodeAggregateWasMoved",
            ContentEvent::NodeAggregateNameWasChanged(_) => "NodeAggregateNameWasChanged",
            ContentEvent::NodeAggregateTypeWasChanged(_) => "NodeAggregateTypeWasChanged",
            ContentEvent::NodeSpecializationVariantWasCreated(_) => {
                "NodeSpecializationVariantWasCreated"
            }
            ContentEvent::NodeGeneralizationVariantWasCreated(_) => {
                "NodeGeneralizationVariantWasCreated"
            }
            ContentEvent::NodePeerVariantWasCreated(_) => "NodePeerVariantWasCreated",
            ContentEvent::SubtreeWasTagged(_) => "SubtreeWasTagged",
            ContentEvent::SubtreeWasUntagged(_) => "SubtreeWasUntagged",
            ContentEvent::NodeAggregateWasRemoved(_) => "NodeAggregateWasRemoved",
            ContentEvent::DimensionSpacePointWasMoved(_) => "DimensionSpacePointWasMoved",
            ContentEvent::DimensionShineThroughWasAdded(_) => "DimensionShineThroughWasAdded",
        }
    }
}
