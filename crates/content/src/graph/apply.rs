//! Event transitions of the content graph.
//!
//! Each transition touches only the state the event names. Anything it
//! refers to that is not there (a parent missing at some point, a variant
//! that was never created) makes that part of the transition a no-op.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use escr_core::NodeAggregateId;
use escr_dimension::{DimensionSpacePoint, DimensionSpacePointHash, OriginDimensionSpacePoint};
use escr_events::{EventEnvelope, Projection, ProjectionError};

use super::{
    AggregateRecord, ContentGraph, ContentStreamGraph, NodeRecord, Placement, Workspace,
};
use crate::events::*;
use crate::property::PropertyValues;
use crate::subtree_tag::SubtreeTag;

impl ContentGraph {
    /// Fold one event. `version` is the event's version within its stream.
    pub fn apply_event(&mut self, event: &ContentEvent, version: u64) {
        match event {
            ContentEvent::RootWorkspaceWasCreated(e) => {
                self.workspaces.insert(
                    e.workspace_name.clone(),
                    Workspace {
                        name: e.workspace_name.clone(),
                        base_workspace_name: None,
                        current_content_stream_id: e.new_content_stream_id.clone(),
                    },
                );
            }
            ContentEvent::WorkspaceWasCreated(e) => {
                self.workspaces.insert(
                    e.workspace_name.clone(),
                    Workspace {
                        name: e.workspace_name.clone(),
                        base_workspace_name: Some(e.base_workspace_name.clone()),
                        current_content_stream_id: e.new_content_stream_id.clone(),
                    },
                );
            }
            ContentEvent::WorkspaceWasPublished(e) => {
                self.switch_content_stream(&e.source_workspace_name, &e.new_source_content_stream_id);
            }
            ContentEvent::WorkspaceWasRebased(e) => {
                self.switch_content_stream(&e.workspace_name, &e.new_content_stream_id);
            }
            ContentEvent::WorkspaceWasDiscarded(e) => {
                self.switch_content_stream(&e.workspace_name, &e.new_content_stream_id);
            }
            ContentEvent::ContentStreamWasCreated(e) => {
                self.content_streams.insert(
                    e.content_stream_id.clone(),
                    ContentStreamGraph::new(e.content_stream_id.clone(), None, version),
                );
            }
            ContentEvent::ContentStreamWasForked(e) => {
                let Some(source) = self.content_streams.get(&e.source_content_stream_id) else {
                    debug!(source = %e.source_content_stream_id, "fork of unknown content stream skipped");
                    return;
                };
                let mut fork = source.clone();
                fork.id = e.new_content_stream_id.clone();
                fork.source = Some(e.source_content_stream_id.clone());
                fork.version = version;
                self.content_streams.insert(e.new_content_stream_id.clone(), fork);
            }
            ContentEvent::ContentStreamWasRemoved(e) => {
                self.content_streams.remove(&e.content_stream_id);
            }
            node_event => {
                let Some(stream_id) = node_event.content_stream_id() else {
                    return;
                };
                let Some(stream) = self.content_streams.get_mut(stream_id) else {
                    debug!(content_stream = %stream_id, event = ?node_event, "event for unknown content stream skipped");
                    return;
                };
                stream.apply(node_event);
                stream.version = version;
            }
        }
    }

    fn switch_content_stream(&mut self, workspace: &escr_core::WorkspaceName, stream: &escr_core::ContentStreamId) {
        if let Some(w) = self.workspaces.get_mut(workspace) {
            w.current_content_stream_id = stream.clone();
        }
    }
}

impl ContentStreamGraph {
    fn apply(&mut self, event: &ContentEvent) {
        match event {
            ContentEvent::RootNodeAggregateWithNodeWasCreated(e) => self.create_root(e),
            ContentEvent::RootNodeAggregateDimensionsWereUpdated(e) => self.update_root_dimensions(e),
            ContentEvent::NodeAggregateWithNodeWasCreated(e) => self.create_node(e),
            ContentEvent::NodePropertiesWereSet(e) => self.set_properties(e),
            ContentEvent::NodeAggregateWasMoved(e) => self.move_node(e),
            ContentEvent::NodeAggregateNameWasChanged(e) => {
                if let Some(record) = self.aggregates.get_mut(&e.node_aggregate_id) {
                    record.node_name = Some(e.new_node_name.clone());
                }
            }
            ContentEvent::NodeAggregateTypeWasChanged(e) => {
                if let Some(record) = self.aggregates.get_mut(&e.node_aggregate_id) {
                    record.node_type_name = e.new_node_type_name.clone();
                }
            }
            ContentEvent::NodeSpecializationVariantWasCreated(_)
            | ContentEvent::NodeGeneralizationVariantWasCreated(_)
            | ContentEvent::NodePeerVariantWasCreated(_) => {
                if let Some(variant) = event.as_node_variant_creation() {
                    self.create_variant(variant);
                }
            }
            ContentEvent::SubtreeWasTagged(e) => {
                for point in e.affected_dimension_space_points.iter() {
                    let Some(h) = self.hierarchies.get_mut(point.hash()) else {
                        continue;
                    };
                    if !h.nodes.contains(&e.node_aggregate_id)
                        || h.is_explicitly_tagged(&e.node_aggregate_id, &e.tag)
                    {
                        continue;
                    }
                    h.shift_levels(&e.node_aggregate_id, &e.tag, 1);
                }
            }
            ContentEvent::SubtreeWasUntagged(e) => {
                for point in e.affected_dimension_space_points.iter() {
                    let Some(h) = self.hierarchies.get_mut(point.hash()) else {
                        continue;
                    };
                    if !h.is_explicitly_tagged(&e.node_aggregate_id, &e.tag) {
                        continue;
                    }
                    h.shift_levels(&e.node_aggregate_id, &e.tag, -1);
                }
            }
            ContentEvent::NodeAggregateWasRemoved(e) => self.remove_node(e),
            ContentEvent::DimensionSpacePointWasMoved(e) => self.move_point(&e.source, &e.target),
            ContentEvent::DimensionShineThroughWasAdded(e) => self.add_shine_through(&e.source, &e.target),
            ContentEvent::RootWorkspaceWasCreated(_)
            | ContentEvent::WorkspaceWasCreated(_)
            | ContentEvent::WorkspaceWasPublished(_)
            | ContentEvent::WorkspaceWasRebased(_)
            | ContentEvent::WorkspaceWasDiscarded(_)
            | ContentEvent::ContentStreamWasCreated(_)
            | ContentEvent::ContentStreamWasForked(_)
            | ContentEvent::ContentStreamWasRemoved(_) => {}
        }
    }

    fn create_root(&mut self, e: &RootNodeAggregateWithNodeWasCreated) {
        let origin = OriginDimensionSpacePoint::empty();
        let origin_hash = origin.hash().clone();
        self.aggregates.insert(
            e.node_aggregate_id.clone(),
            AggregateRecord {
                node_type_name: e.node_type_name.clone(),
                classification: e.node_aggregate_classification,
                node_name: None,
                variants: BTreeMap::from([(
                    origin_hash.clone(),
                    NodeRecord {
                        origin,
                        properties: PropertyValues::new(),
                    },
                )]),
            },
        );
        for point in e.covered_dimension_space_points.iter() {
            self.place_root(&e.node_aggregate_id, point, &origin_hash);
        }
    }

    /// Replaces the points the root covers; whatever hung below it at a dropped point goes too.
    fn update_root_dimensions(&mut self, e: &RootNodeAggregateDimensionsWereUpdated) {
        if !self.aggregates.contains_key(&e.node_aggregate_id) {
            return;
        }
        let mut removed = BTreeSet::new();
        for (hash, h) in self.hierarchies.iter_mut() {
            if !e.covered_dimension_space_points.contains_hash(hash) {
                removed.extend(h.nodes.remove_subtree(&e.node_aggregate_id));
            }
        }
        // The root keeps its single variant even when it covers nothing.
        removed.remove(&e.node_aggregate_id);
        self.collect_garbage(removed);

        let origin_hash = OriginDimensionSpacePoint::empty().hash().clone();
        for point in e.covered_dimension_space_points.iter() {
            let present = self
                .hierarchy(point)
                .is_some_and(|h| h.nodes.contains(&e.node_aggregate_id));
            if !present {
                self.place_root(&e.node_aggregate_id, point, &origin_hash);
            }
        }
    }

    fn place_root(&mut self, id: &NodeAggregateId, point: &DimensionSpacePoint, origin_hash: &DimensionSpacePointHash) {
        self.hierarchy_mut(point).nodes.insert(
            id.clone(),
            None,
            None,
            Placement {
                origin_hash: origin_hash.clone(),
                tag_levels: BTreeMap::new(),
            },
        );
    }

    fn create_node(&mut self, e: &NodeAggregateWithNodeWasCreated) {
        let origin_hash = e.origin_dimension_space_point.hash().clone();
        let mut placed = false;
        for sibling in e.succeeding_siblings_for_coverage.iter() {
            let Some(h) = self.hierarchies.get_mut(sibling.dimension_space_point.hash()) else {
                continue;
            };
            if !h.nodes.contains(&e.parent_node_aggregate_id) {
                continue;
            }
            let tag_levels = h.levels(&e.parent_node_aggregate_id);
            h.nodes.insert(
                e.node_aggregate_id.clone(),
                Some(e.parent_node_aggregate_id.clone()),
                sibling.node_aggregate_id.as_ref(),
                Placement {
                    origin_hash: origin_hash.clone(),
                    tag_levels,
                },
            );
            placed = true;
        }
        if !placed {
            debug!(node = %e.node_aggregate_id, parent = %e.parent_node_aggregate_id, "parent not found, creation skipped");
            return;
        }
        let record = self
            .aggregates
            .entry(e.node_aggregate_id.clone())
            .or_insert_with(|| AggregateRecord {
                node_type_name: e.node_type_name.clone(),
                classification: e.node_aggregate_classification,
                node_name: e.node_name.clone(),
                variants: BTreeMap::new(),
            });
        record.variants.insert(
            origin_hash,
            NodeRecord {
                origin: e.origin_dimension_space_point.clone(),
                properties: e.initial_property_values.clone(),
            },
        );
    }

    fn set_properties(&mut self, e: &NodePropertiesWereSet) {
        let Some(record) = self
            .aggregates
            .get_mut(&e.node_aggregate_id)
            .and_then(|r| r.variants.get_mut(e.origin_dimension_space_point.hash()))
        else {
            return;
        };
        record.properties.merge(&e.property_values, &e.properties_to_unset);
    }

    fn move_node(&mut self, e: &NodeAggregateWasMoved) {
        let id = &e.node_aggregate_id;
        for sibling in e.succeeding_siblings_for_coverage.iter() {
            let Some(h) = self.hierarchies.get_mut(sibling.dimension_space_point.hash()) else {
                continue;
            };
            if !h.nodes.contains(id) {
                continue;
            }
            let old_parent = h.nodes.parent(id).cloned();
            let new_parent = match &e.new_parent_node_aggregate_id {
                Some(parent) => {
                    if !h.nodes.contains(parent) || h.nodes.is_ancestor_or_self(id, parent) {
                        continue;
                    }
                    Some(parent.clone())
                }
                None => old_parent.clone(),
            };

            let own = h.levels(id);
            let old_parent_levels = old_parent.as_ref().map(|p| h.levels(p)).unwrap_or_default();
            let new_parent_levels = new_parent.as_ref().map(|p| h.levels(p)).unwrap_or_default();

            h.nodes.relocate(id, new_parent, sibling.node_aggregate_id.as_ref());

            let tags: BTreeSet<SubtreeTag> = own
                .keys()
                .chain(old_parent_levels.keys())
                .chain(new_parent_levels.keys())
                .cloned()
                .collect();
            for tag in tags {
                let level = |levels: &BTreeMap<SubtreeTag, u32>| levels.get(&tag).copied().unwrap_or(0) as i64;
                let explicit = (level(&own) - level(&old_parent_levels)).max(0);
                let delta = level(&new_parent_levels) + explicit - level(&own);
                h.shift_levels(id, &tag, delta);
            }
        }
    }

    fn create_variant(&mut self, v: NodeVariantCreation<'_>) {
        let id = v.node_aggregate_id;
        let Some(source) = self
            .aggregates
            .get(id)
            .and_then(|r| r.variants.get(v.source_origin.hash()))
            .cloned()
        else {
            debug!(node = %id, "variant source not found, skipped");
            return;
        };
        let source_parent = self
            .hierarchy(&v.source_origin.to_dimension_space_point())
            .and_then(|h| h.nodes.parent(id))
            .cloned();
        let target_hash = v.target_origin.hash().clone();

        let mut placed = false;
        for sibling in v.siblings.iter() {
            let h = self.hierarchy_mut(&sibling.dimension_space_point);
            if let Some(placement) = h.nodes.value_mut(id) {
                placement.origin_hash = target_hash.clone();
                placed = true;
                continue;
            }
            let Some(parent) = source_parent.as_ref().filter(|p| h.nodes.contains(p)) else {
                continue;
            };
            let tag_levels = h.levels(parent);
            h.nodes.insert(
                id.clone(),
                Some(parent.clone()),
                sibling.node_aggregate_id.as_ref(),
                Placement {
                    origin_hash: target_hash.clone(),
                    tag_levels,
                },
            );
            placed = true;
        }
        if !placed {
            return;
        }
        if let Some(record) = self.aggregates.get_mut(id) {
            record.variants.insert(
                target_hash,
                NodeRecord {
                    origin: v.target_origin.clone(),
                    properties: source.properties,
                },
            );
        }
        self.collect_garbage([id.clone()]);
    }

    fn remove_node(&mut self, e: &NodeAggregateWasRemoved) {
        let mut touched = BTreeSet::from([e.node_aggregate_id.clone()]);
        for point in e.affected_covered_dimension_space_points.iter() {
            if let Some(h) = self.hierarchies.get_mut(point.hash()) {
                touched.extend(h.nodes.remove_subtree(&e.node_aggregate_id));
            }
        }
        self.collect_garbage(touched);
    }

    /// Drop variants no placement shows any more, then aggregates without variants.
    fn collect_garbage(&mut self, ids: impl IntoIterator<Item = NodeAggregateId>) {
        for id in ids {
            let referenced: BTreeSet<DimensionSpacePointHash> = self
                .hierarchies
                .values()
                .filter_map(|h| h.nodes.value(&id))
                .map(|p| p.origin_hash.clone())
                .collect();
            let empty = match self.aggregates.get_mut(&id) {
                Some(record) => {
                    record.variants.retain(|hash, _| referenced.contains(hash));
                    record.variants.is_empty()
                }
                None => false,
            };
            if empty {
                self.aggregates.remove(&id);
            }
        }
    }

    fn move_point(&mut self, source: &DimensionSpacePoint, target: &DimensionSpacePoint) {
        if let Some(mut h) = self.hierarchies.remove(source.hash()) {
            h.point = target.clone();
            self.hierarchies.insert(target.hash().clone(), h);
        }
        let target_origin = OriginDimensionSpacePoint::new(target.clone());
        for record in self.aggregates.values_mut() {
            if let Some(mut node) = record.variants.remove(source.hash()) {
                node.origin = target_origin.clone();
                record.variants.insert(target.hash().clone(), node);
            }
        }
        for h in self.hierarchies.values_mut() {
            for placement in h.nodes.values_mut() {
                if &placement.origin_hash == source.hash() {
                    placement.origin_hash = target.hash().clone();
                }
            }
        }
    }

    fn add_shine_through(&mut self, source: &DimensionSpacePoint, target: &DimensionSpacePoint) {
        let Some(h) = self.hierarchies.get(source.hash()) else {
            return;
        };
        let mut copy = h.clone();
        copy.point = target.clone();
        self.hierarchies.insert(target.hash().clone(), copy);
    }
}

impl Projection for ContentGraph {
    type Ev = ContentEvent;

    fn reset(&mut self) -> Result<(), ProjectionError> {
        self.clear();
        Ok(())
    }

    fn apply(&mut self, envelope: &EventEnvelope<ContentEvent>) -> Result<(), ProjectionError> {
        self.apply_event(envelope.payload(), envelope.version());
        Ok(())
    }
}
