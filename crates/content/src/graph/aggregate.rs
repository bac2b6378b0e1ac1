use std::collections::BTreeMap;

use escr_core::{ContentStreamId, NodeAggregateId, NodeName, NodeTypeName};
use escr_dimension::{
    Coverage, DimensionSpacePoint, DimensionSpacePointHash, DimensionSpacePointSet,
    OriginDimensionSpacePoint, OriginDimensionSpacePointSet,
};

use super::ContentStreamGraph;
use crate::node::NodeAggregateClassification;
use crate::property::PropertyValues;
use crate::subtree_tag::SubtreeTag;

/// One materialized variant of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVariant {
    pub origin: OriginDimensionSpacePoint,
    pub properties: PropertyValues,
}

/// All variants of one node aggregate in one content stream, with coverage.
///
/// A snapshot: built on lookup, not updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAggregate {
    id: NodeAggregateId,
    content_stream_id: ContentStreamId,
    node_type_name: NodeTypeName,
    classification: NodeAggregateClassification,
    node_name: Option<NodeName>,
    variants: BTreeMap<DimensionSpacePointHash, NodeVariant>,
    covered: DimensionSpacePointSet,
    occupation: BTreeMap<DimensionSpacePointHash, OriginDimensionSpacePoint>,
    explicit_tags: BTreeMap<SubtreeTag, DimensionSpacePointSet>,
}

impl NodeAggregate {
    pub fn id(&self) -> &NodeAggregateId {
        &self.id
    }

    pub fn content_stream_id(&self) -> &ContentStreamId {
        &self.content_stream_id
    }

    pub fn node_type_name(&self) -> &NodeTypeName {
        &self.node_type_name
    }

    pub fn classification(&self) -> NodeAggregateClassification {
        self.classification
    }

    pub fn is_root(&self) -> bool {
        self.classification.is_root()
    }

    pub fn node_name(&self) -> Option<&NodeName> {
        self.node_name.as_ref()
    }

    pub fn covers(&self, point: &DimensionSpacePoint) -> bool {
        self.covered.contains(point)
    }

    pub fn covered(&self) -> &DimensionSpacePointSet {
        &self.covered
    }

    pub fn occupies(&self, origin: &OriginDimensionSpacePoint) -> bool {
        self.variants.contains_key(origin.hash())
    }

    pub fn occupied(&self) -> OriginDimensionSpacePointSet {
        self.variants.values().map(|v| v.origin.clone()).collect()
    }

    pub fn variant(&self, origin: &OriginDimensionSpacePoint) -> Option<&NodeVariant> {
        self.variants.get(origin.hash())
    }

    pub fn variants(&self) -> impl Iterator<Item = &NodeVariant> {
        self.variants.values()
    }

    /// Covered points showing the variant at `origin`.
    pub fn covered_by_origin(&self, origin: &OriginDimensionSpacePoint) -> DimensionSpacePointSet {
        self.covered
            .iter()
            .filter(|p| self.occupation.get(p.hash()) == Some(origin))
            .cloned()
            .collect()
    }

    pub fn is_explicitly_tagged(&self, tag: &SubtreeTag, point: &DimensionSpacePoint) -> bool {
        self.explicit_tags
            .get(tag)
            .is_some_and(|points| points.contains(point))
    }

    /// Points where `tag` is set on this aggregate itself.
    pub fn points_tagged_with(&self, tag: &SubtreeTag) -> DimensionSpacePointSet {
        self.explicit_tags.get(tag).cloned().unwrap_or_default()
    }
}

impl Coverage for NodeAggregate {
    fn covered_dimension_space_points(&self) -> &DimensionSpacePointSet {
        &self.covered
    }

    fn occupying_origin(&self, covered: &DimensionSpacePoint) -> Option<&OriginDimensionSpacePoint> {
        self.occupation.get(covered.hash())
    }
}

impl ContentStreamGraph {
    pub fn node_aggregate(&self, id: &NodeAggregateId) -> Option<NodeAggregate> {
        let record = self.aggregates.get(id)?;
        let mut covered = DimensionSpacePointSet::new();
        let mut occupation = BTreeMap::new();
        let mut explicit_tags: BTreeMap<SubtreeTag, DimensionSpacePointSet> = BTreeMap::new();

        for h in self.hierarchies.values() {
            let Some(placement) = h.nodes.value(id) else {
                continue;
            };
            covered.insert(h.point.clone());
            if let Some(variant) = record.variants.get(&placement.origin_hash) {
                occupation.insert(h.point.hash().clone(), variant.origin.clone());
            }
            for tag in h.explicit_tags(id) {
                explicit_tags.entry(tag).or_default().insert(h.point.clone());
            }
        }

        Some(NodeAggregate {
            id: id.clone(),
            content_stream_id: self.id().clone(),
            node_type_name: record.node_type_name.clone(),
            classification: record.classification,
            node_name: record.node_name.clone(),
            variants: record
                .variants
                .iter()
                .map(|(hash, r)| {
                    (
                        hash.clone(),
                        NodeVariant {
                            origin: r.origin.clone(),
                            properties: r.properties.clone(),
                        },
                    )
                })
                .collect(),
            covered,
            occupation,
            explicit_tags,
        })
    }

    pub fn node_aggregates(&self) -> impl Iterator<Item = NodeAggregate> + '_ {
        self.aggregates.keys().filter_map(|id| self.node_aggregate(id))
    }

    /// Aggregates that are a parent of `child` at some covered point.
    pub fn parent_node_aggregates(&self, child: &NodeAggregateId) -> Vec<NodeAggregate> {
        let mut ids: Vec<&NodeAggregateId> = self
            .hierarchies
            .values()
            .filter_map(|h| h.nodes.parent(child))
            .collect();
        ids.sort();
        ids.dedup();
        ids.into_iter().filter_map(|id| self.node_aggregate(id)).collect()
    }

    /// Aggregates that are a child of `parent` at some covered point.
    pub fn child_node_aggregates(&self, parent: &NodeAggregateId) -> Vec<NodeAggregate> {
        let mut ids: Vec<&NodeAggregateId> = self
            .hierarchies
            .values()
            .flat_map(|h| h.nodes.children(Some(parent)))
            .collect();
        ids.sort();
        ids.dedup();
        ids.into_iter().filter_map(|id| self.node_aggregate(id)).collect()
    }

    pub fn root_node_aggregate_by_type(&self, node_type_name: &NodeTypeName) -> Option<NodeAggregate> {
        self.aggregates
            .iter()
            .find(|(_, r)| r.classification.is_root() && &r.node_type_name == node_type_name)
            .and_then(|(id, _)| self.node_aggregate(id))
    }

    pub fn node_aggregates_by_type(&self, node_type_name: &NodeTypeName) -> Vec<NodeAggregate> {
        self.aggregates
            .iter()
            .filter(|(_, r)| &r.node_type_name == node_type_name)
            .filter_map(|(id, _)| self.node_aggregate(id))
            .collect()
    }
}
