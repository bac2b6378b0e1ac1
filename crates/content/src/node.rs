//! Read-side node types handed out by queries.

use serde::{Deserialize, Serialize};

use escr_core::{ContentStreamId, NodeAggregateId, NodeName, NodeTypeName};
use escr_dimension::{DimensionSpacePoint, OriginDimensionSpacePoint};

use crate::property::PropertyValues;
use crate::subtree_tag::{NodeTags, SubtreeTag};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeAggregateClassification {
    /// Covers every allowed point and has no parent.
    Root,
    Regular,
}

impl NodeAggregateClassification {
    pub fn is_root(self) -> bool {
        matches!(self, Self::Root)
    }
}

/// One node variant as seen from one dimension space point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub aggregate_id: NodeAggregateId,
    pub content_stream_id: ContentStreamId,
    pub dimension_space_point: DimensionSpacePoint,
    pub origin_dimension_space_point: OriginDimensionSpacePoint,
    pub node_type_name: NodeTypeName,
    pub name: Option<NodeName>,
    pub classification: NodeAggregateClassification,
    pub properties: PropertyValues,
    pub tags: NodeTags,
}

impl Node {
    pub fn is_tagged(&self, tag: &SubtreeTag) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_root(&self) -> bool {
        self.classification.is_root()
    }
}
