//! The closed set of content repository commands.
//!
//! Workspace commands manage content streams and are handled by the
//! infrastructure layer. Node and dimension commands are *rebaseable*: they
//! are recorded on the events they produce and can be replayed against a
//! different base.

use serde::{Deserialize, Serialize};

use escr_core::{ContentStreamId, NodeAggregateId, NodeName, NodeTypeName, WorkspaceName};
use escr_dimension::{DimensionSpacePoint, NodeVariantSelectionStrategy, OriginDimensionSpacePoint};
use escr_events::{Command, SequenceNumber};

use crate::property::PropertyValues;
use crate::subtree_tag::SubtreeTag;

// --- workspace commands ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRootWorkspace {
    pub workspace_name: WorkspaceName,
    pub new_content_stream_id: ContentStreamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkspace {
    pub workspace_name: WorkspaceName,
    pub base_workspace_name: WorkspaceName,
    pub new_content_stream_id: ContentStreamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishWorkspace {
    pub workspace_name: WorkspaceName,
    /// Content stream the workspace continues on after publishing.
    pub new_content_stream_id: ContentStreamId,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RebaseErrorHandlingStrategy {
    /// Abort the rebase if any command fails.
    #[default]
    Fail,
    /// Skip failing commands and rebase anyway.
    Force,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseWorkspace {
    pub workspace_name: WorkspaceName,
    pub rebased_content_stream_id: ContentStreamId,
    #[serde(default)]
    pub error_handling_strategy: RebaseErrorHandlingStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardWorkspace {
    pub workspace_name: WorkspaceName,
    pub new_content_stream_id: ContentStreamId,
}

// --- node commands ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRootNodeAggregateWithNode {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub node_type_name: NodeTypeName,
}

/// Extend a root node aggregate onto every currently allowed point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRootNodeAggregateDimensions {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNodeAggregateWithNode {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub node_type_name: NodeTypeName,
    pub origin_dimension_space_point: OriginDimensionSpacePoint,
    pub parent_node_aggregate_id: NodeAggregateId,
    #[serde(default)]
    pub succeeding_sibling_node_aggregate_id: Option<NodeAggregateId>,
    #[serde(default)]
    pub node_name: Option<NodeName>,
    #[serde(default)]
    pub initial_property_values: PropertyValues,
}

/// A `null` value unsets the property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetNodeProperties {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub origin_dimension_space_point: OriginDimensionSpacePoint,
    pub property_values: PropertyValues,
}

/// Which covered points a move applies to.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationDistributionStrategy {
    /// Only the given point.
    Scatter,
    /// The given point and its covered specializations.
    GatherSpecializations,
    /// Every covered point.
    #[default]
    GatherAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNodeAggregate {
    pub workspace_name: WorkspaceName,
    pub dimension_space_point: DimensionSpacePoint,
    pub node_aggregate_id: NodeAggregateId,
    #[serde(default)]
    pub new_parent_node_aggregate_id: Option<NodeAggregateId>,
    #[serde(default)]
    pub new_succeeding_sibling_node_aggregate_id: Option<NodeAggregateId>,
    #[serde(default)]
    pub relation_distribution_strategy: RelationDistributionStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNodeAggregateName {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub new_node_name: NodeName,
}

/// What to do with children the new type no longer allows.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeChangeStrategy {
    /// Reject the change.
    #[default]
    HappyPath,
    /// Remove the offending children.
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNodeAggregateType {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub new_node_type_name: NodeTypeName,
    #[serde(default)]
    pub strategy: TypeChangeStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNodeVariant {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub source_origin: OriginDimensionSpacePoint,
    pub target_origin: OriginDimensionSpacePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSubtree {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub covered_dimension_space_point: DimensionSpacePoint,
    #[serde(default)]
    pub node_variant_selection_strategy: NodeVariantSelectionStrategy,
    pub tag: SubtreeTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntagSubtree {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub covered_dimension_space_point: DimensionSpacePoint,
    #[serde(default)]
    pub node_variant_selection_strategy: NodeVariantSelectionStrategy,
    pub tag: SubtreeTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveNodeAggregate {
    pub workspace_name: WorkspaceName,
    pub node_aggregate_id: NodeAggregateId,
    pub covered_dimension_space_point: DimensionSpacePoint,
    #[serde(default)]
    pub node_variant_selection_strategy: NodeVariantSelectionStrategy,
}

// --- dimension space commands ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveDimensionSpacePoint {
    pub workspace_name: WorkspaceName,
    pub source: DimensionSpacePoint,
    pub target: DimensionSpacePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDimensionShineThrough {
    pub workspace_name: WorkspaceName,
    pub source: DimensionSpacePoint,
    pub target: DimensionSpacePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentCommand {
    CreateRootWorkspace(CreateRootWorkspace),
    CreateWorkspace(CreateWorkspace),
    PublishWorkspace(PublishWorkspace),
    RebaseWorkspace(RebaseWorkspace),
    DiscardWorkspace(DiscardWorkspace),
    CreateRootNodeAggregateWithNode(CreateRootNodeAggregateWithNode),
    UpdateRootNodeAggregateDimensions(UpdateRootNodeAggregateDimensions),
    CreateNodeAggregateWithNode(CreateNodeAggregateWithNode),
    SetNodeProperties(SetNodeProperties),
    MoveNodeAggregate(MoveNodeAggregate),
    ChangeNodeAggregateName(ChangeNodeAggregateName),
    ChangeNodeAggregateType(ChangeNodeAggregateType),
    CreateNodeVariant(CreateNodeVariant),
    TagSubtree(TagSubtree),
    UntagSubtree(UntagSubtree),
    RemoveNodeAggregate(RemoveNodeAggregate),
    MoveDimensionSpacePoint(MoveDimensionSpacePoint),
    AddDimensionShineThrough(AddDimensionShineThrough),
}

macro_rules! rebaseable_fields {
    ($value:expr, $c:ident => $body:expr, else $other:expr) => {
        match $value {
            ContentCommand::CreateRootNodeAggregateWithNode($c) => $body,
            ContentCommand::UpdateRootNodeAggregateDimensions($c) => $body,
            ContentCommand::CreateNodeAggregateWithNode($c) => $body,
            ContentCommand::SetNodeProperties($c) => $body,
            ContentCommand::MoveNodeAggregate($c) => $body,
            ContentCommand::ChangeNodeAggregateName($c) => $body,
            ContentCommand::ChangeNodeAggregateType($c) => $body,
            ContentCommand::CreateNodeVariant($c) => $body,
            ContentCommand::TagSubtree($c) => $body,
            ContentCommand::UntagSubtree($c) => $body,
            ContentCommand::RemoveNodeAggregate($c) => $body,
            ContentCommand::MoveDimensionSpacePoint($c) => $body,
            ContentCommand::AddDimensionShineThrough($c) => $body,
            _ => $other,
        }
    };
}

impl ContentCommand {
    pub fn workspace_name(&self) -> &WorkspaceName {
        match self {
            ContentCommand::CreateRootWorkspace(c) => &c.workspace_name,
            ContentCommand::CreateWorkspace(c) => &c.workspace_name,
            ContentCommand::PublishWorkspace(c) => &c.workspace_name,
            ContentCommand::RebaseWorkspace(c) => &c.workspace_name,
            ContentCommand::DiscardWorkspace(c) => &c.workspace_name,
            ContentCommand::CreateRootNodeAggregateWithNode(c) => &c.workspace_name,
            ContentCommand::UpdateRootNodeAggregateDimensions(c) => &c.workspace_name,
            ContentCommand::CreateNodeAggregateWithNode(c) => &c.workspace_name,
            ContentCommand::SetNodeProperties(c) => &c.workspace_name,
            ContentCommand::MoveNodeAggregate(c) => &c.workspace_name,
            ContentCommand::ChangeNodeAggregateName(c) => &c.workspace_name,
            ContentCommand::ChangeNodeAggregateType(c) => &c.workspace_name,
            ContentCommand::CreateNodeVariant(c) => &c.workspace_name,
            ContentCommand::TagSubtree(c) => &c.workspace_name,
            ContentCommand::UntagSubtree(c) => &c.workspace_name,
            ContentCommand::RemoveNodeAggregate(c) => &c.workspace_name,
            ContentCommand::MoveDimensionSpacePoint(c) => &c.workspace_name,
            ContentCommand::AddDimensionShineThrough(c) => &c.workspace_name,
        }
    }

    /// Node and dimension commands, the ones replayed by publish and rebase.
    pub fn is_rebaseable(&self) -> bool {
        rebaseable_fields!(self, _c => true, else false)
    }

    pub fn is_dimension_space_command(&self) -> bool {
        matches!(
            self,
            ContentCommand::MoveDimensionSpacePoint(_) | ContentCommand::AddDimensionShineThrough(_)
        )
    }

    /// The same command addressed to another workspace.
    ///
    /// Workspace commands are returned unchanged.
    pub fn with_workspace_name(mut self, workspace_name: &WorkspaceName) -> Self {
        rebaseable_fields!(&mut self, c => {
            c.workspace_name = workspace_name.clone();
        }, else ());
        self
    }
}

impl Command for ContentCommand {
    fn command_type(&self) -> &'static str {
        match self {
            ContentCommand::CreateRootWorkspace(_) => "CreateRootWorkspace",
            ContentCommand::CreateWorkspace(_) => "CreateWorkspace",
            ContentCommand::PublishWorkspace(_) => "PublishWorkspace",
            ContentCommand::RebaseWorkspace(_) => "RebaseWorkspace",
            ContentCommand::DiscardWorkspace(_) => "DiscardWorkspace",
            ContentCommand::CreateRootNodeAggregateWithNode(_) => "CreateRootNodeAggregateWithNode",
            ContentCommand::UpdateRootNodeAggregateDimensions(_) => {
                "UpdateRootNodeAggregateDimensions"
            }
            ContentCommand::CreateNodeAggregateWithNode(_) => "CreateNodeAggregateWithNode",
            ContentCommand::SetNodeProperties(_) => "SetNodeProperties",
            ContentCommand::MoveNodeAggregate(_) => "MoveNodeAggregate",
            ContentCommand::ChangeNodeAggregateName(_) => "ChangeNodeAggregateName",
            ContentCommand::ChangeNodeAggregateType(_) => "ChangeNodeAggregateType",
            ContentCommand::CreateNodeVariant(_) => "CreateNodeVariant",
            ContentCommand::TagSubtree(_) => "TagSubtree",
            ContentCommand::UntagSubtree(_) => "UntagSubtree",
            ContentCommand::RemoveNodeAggregate(_) => "RemoveNodeAggregate",
            ContentCommand::MoveDimensionSpacePoint(_) => "MoveDimensionSpacePoint",
            ContentCommand::AddDimensionShineThrough(_) => "AddDimensionShineThrough",
        }
    }
}

/// A recorded command that could not be replayed during a rebase or publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandThatFailed {
    /// Sequence number of the first event the command originally produced.
    pub sequence_number: SequenceNumber,
    pub command: ContentCommand,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_command() -> ContentCommand {
        ContentCommand::TagSubtree(TagSubtree {
            workspace_name: WorkspaceName::new("user-a").unwrap(),
            node_aggregate_id: NodeAggregateId::new("n").unwrap(),
            covered_dimension_space_point: DimensionSpacePoint::empty(),
            node_variant_selection_strategy: NodeVariantSelectionStrategy::AllSpecializations,
            tag: SubtreeTag::disabled(),
        })
    }

    #[test]
    fn rebaseable_commands_can_be_readdressed() {
        let command = tag_command();
        assert!(command.is_rebaseable());
        let moved = command.with_workspace_name(&WorkspaceName::live());
        assert!(moved.workspace_name().is_live());
    }

    #[test]
    fn workspace_commands_are_not_rebaseable() {
        let command = ContentCommand::DiscardWorkspace(DiscardWorkspace {
            workspace_name: WorkspaceName::new("user-a").unwrap(),
            new_content_stream_id: ContentStreamId::new("cs").unwrap(),
        });
        assert!(!command.is_rebaseable());
        let same = command.clone().with_workspace_name(&WorkspaceName::live());
        assert_eq!(same, command);
    }

    #[test]
    fn commands_round_trip_through_json_with_type_tag() {
        let command = tag_command();
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["type"], "TagSubtree");
        let back: ContentCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, command);
    }
}
