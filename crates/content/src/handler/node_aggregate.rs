use escr_core::{ContentStreamId, DomainError, DomainResult, ExpectedVersion, WorkspaceName};
use escr_dimension::{Coverage, DimensionSpacePoint, DimensionSpacePointSet, VariantType};
use escr_events::{Command, CommandHandler, EventsToPublish, StreamName};

use super::constraints::*;
use super::NodeAggregateCommandHandler;
use crate::commands::*;
use crate::events::*;
use crate::graph::NodeAggregate;
use crate::node::NodeAggregateClassification;
use crate::node_type::NodeType;
use crate::property::PropertyValues;
use crate::read_model::ContentGraphReadModel;

type ReadModel = dyn ContentGraphReadModel;

impl CommandHandler for NodeAggregateCommandHandler {
    type Cmd = ContentCommand;
    type Ev = ContentEvent;
    type ReadModel = dyn ContentGraphReadModel;
    type Error = DomainError;

    fn can_handle(&self, command: &Self::Cmd) -> bool {
        command.is_rebaseable() && !command.is_dimension_space_command()
    }

    fn handle(
        &self,
        command: &Self::Cmd,
        read_model: &Self::ReadModel,
    ) -> DomainResult<EventsToPublish<ContentEvent>> {
        let (stream, version) = require_content_stream(read_model, command.workspace_name())?;
        let events = match command {
            ContentCommand::CreateRootNodeAggregateWithNode(c) => self.create_root(c, read_model, &stream)?,
            ContentCommand::UpdateRootNodeAggregateDimensions(c) => {
                self.update_root_dimensions(c, read_model, &stream)?
            }
            ContentCommand::CreateNodeAggregateWithNode(c) => self.create_node(c, read_model, &stream)?,
            ContentCommand::SetNodeProperties(c) => self.set_properties(c, read_model, &stream)?,
            ContentCommand::MoveNodeAggregate(c) => self.move_node(c, read_model, &stream)?,
            ContentCommand::ChangeNodeAggregateName(c) => self.change_name(c, read_model, &stream)?,
            ContentCommand::ChangeNodeAggregateType(c) => self.change_type(c, read_model, &stream)?,
            ContentCommand::CreateNodeVariant(c) => self.create_variant(c, read_model, &stream)?,
            ContentCommand::TagSubtree(c) => self.tag_subtree(c, read_model, &stream)?,
            ContentCommand::UntagSubtree(c) => self.untag_subtree(c, read_model, &stream)?,
            ContentCommand::RemoveNodeAggregate(c) => self.remove(c, read_model, &stream)?,
            other => {
                return Err(DomainError::validation(format!(
                    "{} is not a node aggregate command",
                    other.command_type()
                )));
            }
        };
        Ok(EventsToPublish::new(
            StreamName::for_content_stream(&stream),
            events,
            ExpectedVersion::Exact(version),
        ))
    }
}

impl NodeAggregateCommandHandler {
    fn create_root(
        &self,
        c: &CreateRootNodeAggregateWithNode,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        let node_type = require_node_type(&self.node_types, &c.node_type_name)?;
        if !node_type.is_root() {
            return Err(DomainError::constraint(format!(
                "node type '{}' is not a root node type",
                c.node_type_name
            )));
        }
        require_aggregate_absent(read_model, stream, &c.node_aggregate_id)?;
        if read_model
            .find_root_node_aggregate_by_type(stream, &c.node_type_name)
            .is_some()
        {
            return Err(DomainError::constraint(format!(
                "a root node aggregate of type '{}' already exists",
                c.node_type_name
            )));
        }
        Ok(vec![ContentEvent::RootNodeAggregateWithNodeWasCreated(
            RootNodeAggregateWithNodeWasCreated {
                workspace_name: c.workspace_name.clone(),
                content_stream_id: stream.clone(),
                node_aggregate_id: c.node_aggregate_id.clone(),
                node_type_name: c.node_type_name.clone(),
                covered_dimension_space_points: self.variation_graph.allowed_points().clone(),
                node_aggregate_classification: NodeAggregateClassification::Root,
            },
        )])
    }

    fn update_root_dimensions(
        &self,
        c: &UpdateRootNodeAggregateDimensions,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        if !aggregate.is_root() {
            return Err(DomainError::constraint(format!(
                "node aggregate '{}' is not a root node aggregate",
                c.node_aggregate_id
            )));
        }
        Ok(vec![ContentEvent::RootNodeAggregateDimensionsWereUpdated(
            RootNodeAggregateDimensionsWereUpdated {
                workspace_name: c.workspace_name.clone(),
                content_stream_id: stream.clone(),
                node_aggregate_id: c.node_aggregate_id.clone(),
                covered_dimension_space_points: self.variation_graph.allowed_points().clone(),
            },
        )])
    }

    fn create_node(
        &self,
        c: &CreateNodeAggregateWithNode,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        let origin = c.origin_dimension_space_point.to_dimension_space_point();
        require_point(&self.variation_graph, &origin)?;
        let node_type = require_regular_node_type(&self.node_types, &c.node_type_name)?;
        require_aggregate_absent(read_model, stream, &c.node_aggregate_id)?;
        let parent = require_aggregate(read_model, stream, &c.parent_node_aggregate_id)?;
        require_covers(&parent, &origin)?;
        require_child_allowed(&self.node_types, parent.node_type_name(), &c.node_type_name)?;
        require_properties_declared(node_type, &c.initial_property_values)?;

        let covered = self
            .variation_graph
            .specialization_set(&origin, true)
            .map_err(from_configuration)?
            .intersection(parent.covered());
        if let Some(name) = &c.node_name {
            require_name_free(read_model, stream, parent.id(), name, &covered, None)?;
        }
        if let Some(sibling) = &c.succeeding_sibling_node_aggregate_id {
            require_aggregate(read_model, stream, sibling)?;
        }

        let siblings = siblings_for(
            read_model,
            stream,
            |_| Some(parent.id().clone()),
            c.succeeding_sibling_node_aggregate_id.as_ref(),
            &covered,
        );
        let (values, _) = c.initial_property_values.split_unset();

        Ok(vec![ContentEvent::NodeAggregateWithNodeWasCreated(
            NodeAggregateWithNodeWasCreated {
                workspace_name: c.workspace_name.clone(),
                content_stream_id: stream.clone(),
                node_aggregate_id: c.node_aggregate_id.clone(),
                node_type_name: c.node_type_name.clone(),
                origin_dimension_space_point: c.origin_dimension_space_point.clone(),
                succeeding_siblings_for_coverage: siblings,
                parent_node_aggregate_id: c.parent_node_aggregate_id.clone(),
                node_name: c.node_name.clone(),
                initial_property_values: with_defaults(node_type, values),
                node_aggregate_classification: NodeAggregateClassification::Regular,
            },
        )])
    }

    fn set_properties(
        &self,
        c: &SetNodeProperties,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        require_point(
            &self.variation_graph,
            &c.origin_dimension_space_point.to_dimension_space_point(),
        )?;
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        if !aggregate.occupies(&c.origin_dimension_space_point) {
            return Err(DomainError::constraint(format!(
                "node aggregate '{}' has no variant at {}",
                c.node_aggregate_id, c.origin_dimension_space_point
            )));
        }
        let node_type = require_node_type(&self.node_types, aggregate.node_type_name())?;
        // Unsetting is always allowed, so undeclared leftovers can be cleaned up.
        let (values, unset) = c.property_values.split_unset();
        require_properties_declared(node_type, &values)?;

        Ok(vec![ContentEvent::NodePropertiesWereSet(NodePropertiesWereSet {
            workspace_name: c.workspace_name.clone(),
            content_stream_id: stream.clone(),
            node_aggregate_id: c.node_aggregate_id.clone(),
            origin_dimension_space_point: c.origin_dimension_space_point.clone(),
            affected_dimension_space_points: aggregate.covered_by_origin(&c.origin_dimension_space_point),
            property_values: values,
            properties_to_unset: unset,
        })])
    }

    fn move_node(
        &self,
        c: &MoveNodeAggregate,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        require_point(&self.variation_graph, &c.dimension_space_point)?;
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        require_not_root(&aggregate)?;
        require_covers(&aggregate, &c.dimension_space_point)?;
        if c.new_parent_node_aggregate_id.is_none() && c.new_succeeding_sibling_node_aggregate_id.is_none() {
            return Err(DomainError::constraint("a move needs a new parent or a new sibling"));
        }

        let affected = match c.relation_distribution_strategy {
            RelationDistributionStrategy::Scatter => {
                DimensionSpacePointSet::single(c.dimension_space_point.clone())
            }
            RelationDistributionStrategy::GatherSpecializations => self
                .variation_graph
                .specialization_set(&c.dimension_space_point, true)
                .map_err(from_configuration)?
                .intersection(aggregate.covered()),
            RelationDistributionStrategy::GatherAll => aggregate.covered().clone(),
        };

        if let Some(parent_id) = &c.new_parent_node_aggregate_id {
            let parent = require_aggregate(read_model, stream, parent_id)?;
            if !affected.is_subset_of(parent.covered()) {
                return Err(DomainError::constraint(format!(
                    "new parent '{parent_id}' does not cover every affected dimension space point"
                )));
            }
            for point in affected.iter() {
                if read_model.is_ancestor_or_self(stream, &c.node_aggregate_id, parent_id, point) {
                    return Err(DomainError::constraint(format!(
                        "node aggregate '{}' cannot be moved below itself",
                        c.node_aggregate_id
                    )));
                }
            }
            require_child_allowed(&self.node_types, parent.node_type_name(), aggregate.node_type_name())?;
            if let Some(name) = aggregate.node_name() {
                require_name_free(read_model, stream, parent_id, name, &affected, Some(aggregate.id()))?;
            }
        }
        if let Some(sibling) = &c.new_succeeding_sibling_node_aggregate_id {
            if sibling == &c.node_aggregate_id {
                return Err(DomainError::constraint("a node cannot be its own sibling"));
            }
            require_aggregate(read_model, stream, sibling)?;
        }

        let siblings = siblings_for(
            read_model,
            stream,
            |point| match &c.new_parent_node_aggregate_id {
                Some(parent) => Some(parent.clone()),
                None => read_model.find_parent_node_aggregate_id(stream, &c.node_aggregate_id, point),
            },
            c.new_succeeding_sibling_node_aggregate_id.as_ref(),
            &affected,
        );

        Ok(vec![ContentEvent::NodeAggregateWasMoved(NodeAggregateWasMoved {
            workspace_name: c.workspace_name.clone(),
            content_stream_id: stream.clone(),
            node_aggregate_id: c.node_aggregate_id.clone(),
            new_parent_node_aggregate_id: c.new_parent_node_aggregate_id.clone(),
            succeeding_siblings_for_coverage: siblings,
        })])
    }

    fn change_name(
        &self,
        c: &ChangeNodeAggregateName,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        require_not_root(&aggregate)?;
        for parent in read_model.find_parent_node_aggregates(stream, aggregate.id()) {
            require_name_free(
                read_model,
                stream,
                parent.id(),
                &c.new_node_name,
                aggregate.covered(),
                Some(aggregate.id()),
            )?;
        }
        Ok(vec![ContentEvent::NodeAggregateNameWasChanged(NodeAggregateNameWasChanged {
            workspace_name: c.workspace_name.clone(),
            content_stream_id: stream.clone(),
            node_aggregate_id: c.node_aggregate_id.clone(),
            new_node_name: c.new_node_name.clone(),
        })])
    }

    fn change_type(
        &self,
        c: &ChangeNodeAggregateType,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        require_not_root(&aggregate)?;
        require_regular_node_type(&self.node_types, &c.new_node_type_name)?;
        for parent in read_model.find_parent_node_aggregates(stream, aggregate.id()) {
            require_child_allowed(&self.node_types, parent.node_type_name(), &c.new_node_type_name)?;
        }

        let mut events = Vec::new();
        for child in read_model.find_child_node_aggregates(stream, aggregate.id()) {
            if self.node_types.allows_child(&c.new_node_type_name, child.node_type_name()) {
                continue;
            }
            match c.strategy {
                TypeChangeStrategy::HappyPath => {
                    return Err(DomainError::constraint(format!(
                        "node type '{}' does not allow existing child '{}' of type '{}'",
                        c.new_node_type_name,
                        child.id(),
                        child.node_type_name()
                    )));
                }
                TypeChangeStrategy::Delete => {
                    events.push(removal(&c.workspace_name, stream, &child, child.covered().clone()));
                }
            }
        }
        events.push(ContentEvent::NodeAggregateTypeWasChanged(NodeAggregateTypeWasChanged {
            workspace_name: c.workspace_name.clone(),
            content_stream_id: stream.clone(),
            node_aggregate_id: c.node_aggregate_id.clone(),
            new_node_type_name: c.new_node_type_name.clone(),
        }));
        Ok(events)
    }

    fn create_variant(
        &self,
        c: &CreateNodeVariant,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        let source = c.source_origin.to_dimension_space_point();
        let target = c.target_origin.to_dimension_space_point();
        require_point(&self.variation_graph, &source)?;
        require_point(&self.variation_graph, &target)?;
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        require_not_root(&aggregate)?;
        if !aggregate.occupies(&c.source_origin) {
            return Err(DomainError::constraint(format!(
                "node aggregate '{}' has no variant at {}",
                c.node_aggregate_id, c.source_origin
            )));
        }
        if aggregate.occupies(&c.target_origin) {
            return Err(DomainError::constraint(format!(
                "node aggregate '{}' already has a variant at {}",
                c.node_aggregate_id, c.target_origin
            )));
        }
        let parent_id = read_model
            .find_parent_node_aggregate_id(stream, aggregate.id(), &source)
            .ok_or_else(|| {
                DomainError::constraint(format!(
                    "node aggregate '{}' has no parent at {source}",
                    c.node_aggregate_id
                ))
            })?;
        let parent = require_aggregate(read_model, stream, &parent_id)?;
        if !parent.covers(&target) {
            return Err(DomainError::constraint(format!(
                "parent '{parent_id}' does not cover {target}"
            )));
        }

        let variant_type = self
            .variation_graph
            .variant_type(&source, &target)
            .map_err(from_configuration)?;
        let covered = self.variant_coverage(&aggregate, &parent, &target)?;
        let source_sibling = read_model.find_succeeding_sibling_id(stream, aggregate.id(), &source);
        let siblings = InterdimensionalSiblings::new(
            covered
                .iter()
                .map(|point| {
                    let node_aggregate_id = if aggregate.covers(point) {
                        read_model.find_succeeding_sibling_id(stream, aggregate.id(), point)
                    } else {
                        source_sibling.clone().filter(|s| {
                            read_model.find_parent_node_aggregate_id(stream, s, point).as_ref()
                                == Some(&parent_id)
                        })
                    };
                    InterdimensionalSibling {
                        dimension_space_point: point.clone(),
                        node_aggregate_id,
                    }
                })
                .collect(),
        );

        let workspace_name = c.workspace_name.clone();
        let content_stream_id = stream.clone();
        let node_aggregate_id = c.node_aggregate_id.clone();
        let source_origin = c.source_origin.clone();
        let event = match variant_type {
            VariantType::Specialization => {
                ContentEvent::NodeSpecializationVariantWasCreated(NodeSpecializationVariantWasCreated {
                    workspace_name,
                    content_stream_id,
                    node_aggregate_id,
                    source_origin,
                    specialization_origin: c.target_origin.clone(),
                    specialization_siblings: siblings,
                })
            }
            VariantType::Generalization => {
                ContentEvent::NodeGeneralizationVariantWasCreated(NodeGeneralizationVariantWasCreated {
                    workspace_name,
                    content_stream_id,
                    node_aggregate_id,
                    source_origin,
                    generalization_origin: c.target_origin.clone(),
                    variant_succeeding_siblings: siblings,
                })
            }
            VariantType::Peer => ContentEvent::NodePeerVariantWasCreated(NodePeerVariantWasCreated {
                workspace_name,
                content_stream_id,
                node_aggregate_id,
                source_origin,
                peer_origin: c.target_origin.clone(),
                peer_succeeding_siblings: siblings,
            }),
            VariantType::Same => {
                return Err(DomainError::constraint("source and target origin are the same"));
            }
        };
        Ok(vec![event])
    }

    /// Points a new variant at `target` takes over.
    ///
    /// All specializations of the target the parent covers, except those
    /// already showing a variant at least as specific as the target.
    fn variant_coverage(
        &self,
        aggregate: &NodeAggregate,
        parent: &NodeAggregate,
        target: &DimensionSpacePoint,
    ) -> DomainResult<DimensionSpacePointSet> {
        let candidates = self
            .variation_graph
            .specialization_set(target, true)
            .map_err(from_configuration)?
            .intersection(parent.covered());
        let mut covered = DimensionSpacePointSet::new();
        for point in candidates.iter() {
            let takes_over = match aggregate.occupying_origin(point) {
                None => true,
                Some(origin) => self
                    .variation_graph
                    .is_specialization(target, origin.as_dimension_space_point())
                    .map_err(from_configuration)?,
            };
            if takes_over {
                covered.insert(point.clone());
            }
        }
        Ok(covered)
    }

    fn tag_subtree(
        &self,
        c: &TagSubtree,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        require_point(&self.variation_graph, &c.covered_dimension_space_point)?;
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        require_covers(&aggregate, &c.covered_dimension_space_point)?;
        if aggregate.is_explicitly_tagged(&c.tag, &c.covered_dimension_space_point) {
            return Err(DomainError::constraint(format!(
                "node aggregate '{}' is already tagged '{}' at {}",
                c.node_aggregate_id, c.tag, c.covered_dimension_space_point
            )));
        }
        let affected = c
            .node_variant_selection_strategy
            .resolve_affected_points(&c.covered_dimension_space_point, &aggregate, &self.variation_graph)
            .map_err(from_configuration)?;
        Ok(vec![ContentEvent::SubtreeWasTagged(SubtreeWasTagged {
            workspace_name: c.workspace_name.clone(),
            content_stream_id: stream.clone(),
            node_aggregate_id: c.node_aggregate_id.clone(),
            affected_dimension_space_points: affected,
            tag: c.tag.clone(),
        })])
    }

    fn untag_subtree(
        &self,
        c: &UntagSubtree,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        require_point(&self.variation_graph, &c.covered_dimension_space_point)?;
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        require_covers(&aggregate, &c.covered_dimension_space_point)?;
        if !aggregate.is_explicitly_tagged(&c.tag, &c.covered_dimension_space_point) {
            return Err(DomainError::constraint(format!(
                "node aggregate '{}' is not explicitly tagged '{}' at {}",
                c.node_aggregate_id, c.tag, c.covered_dimension_space_point
            )));
        }
        let affected = c
            .node_variant_selection_strategy
            .resolve_affected_points(&c.covered_dimension_space_point, &aggregate, &self.variation_graph)
            .map_err(from_configuration)?;
        Ok(vec![ContentEvent::SubtreeWasUntagged(SubtreeWasUntagged {
            workspace_name: c.workspace_name.clone(),
            content_stream_id: stream.clone(),
            node_aggregate_id: c.node_aggregate_id.clone(),
            affected_dimension_space_points: affected,
            tag: c.tag.clone(),
        })])
    }

    fn remove(
        &self,
        c: &RemoveNodeAggregate,
        read_model: &ReadModel,
        stream: &ContentStreamId,
    ) -> DomainResult<Vec<ContentEvent>> {
        require_point(&self.variation_graph, &c.covered_dimension_space_point)?;
        let aggregate = require_aggregate(read_model, stream, &c.node_aggregate_id)?;
        require_not_root(&aggregate)?;
        require_covers(&aggregate, &c.covered_dimension_space_point)?;
        let affected = c
            .node_variant_selection_strategy
            .resolve_affected_points(&c.covered_dimension_space_point, &aggregate, &self.variation_graph)
            .map_err(from_configuration)?;
        Ok(vec![removal(&c.workspace_name, stream, &aggregate, affected)])
    }
}

/// Removal of `aggregate` from `covered`; variants left without coverage go with it.
fn removal(
    workspace_name: &WorkspaceName,
    stream: &ContentStreamId,
    aggregate: &NodeAggregate,
    covered: DimensionSpacePointSet,
) -> ContentEvent {
    let occupied = aggregate
        .occupied()
        .iter()
        .filter(|origin| aggregate.covered_by_origin(origin).is_subset_of(&covered))
        .cloned()
        .collect();
    ContentEvent::NodeAggregateWasRemoved(NodeAggregateWasRemoved {
        workspace_name: workspace_name.clone(),
        content_stream_id: stream.clone(),
        node_aggregate_id: aggregate.id().clone(),
        affected_occupied_dimension_space_points: occupied,
        affected_covered_dimension_space_points: covered,
    })
}

/// Fill in declared defaults for properties the command left out.
fn with_defaults(node_type: &NodeType, values: PropertyValues) -> PropertyValues {
    let mut merged = values;
    for (name, config) in node_type.properties() {
        if let (false, Some(default)) = (merged.contains(name), &config.default_value) {
            merged = merged.with(name.clone(), default.clone());
        }
    }
    merged
}
