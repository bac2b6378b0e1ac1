//! Read queries against one content stream at one dimension space point.

use std::collections::BTreeSet;

use escr_core::{NodeAggregateId, NodeName, NodeTypeName};
use escr_dimension::DimensionSpacePoint;

use super::{ContentStreamGraph, Hierarchy};
use crate::node::Node;
use crate::node_path::NodePath;
use crate::node_type::NodeTypeManager;
use crate::subtree_tag::{NodeTags, SubtreeTag};

/// Which tagged subtrees a query hides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityConstraints {
    excluded: BTreeSet<SubtreeTag>,
}

impl Default for VisibilityConstraints {
    /// Hides disabled subtrees.
    fn default() -> Self {
        Self {
            excluded: BTreeSet::from([SubtreeTag::disabled()]),
        }
    }
}

impl VisibilityConstraints {
    pub fn without_restrictions() -> Self {
        Self {
            excluded: BTreeSet::new(),
        }
    }

    pub fn excluding(tags: impl IntoIterator<Item = SubtreeTag>) -> Self {
        Self {
            excluded: tags.into_iter().collect(),
        }
    }

    pub fn excludes(&self, tags: &NodeTags) -> bool {
        tags.all().any(|t| self.excluded.contains(t))
    }
}

/// Node type filter, resolved through inheritance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTypeCriteria {
    pub allowed: Vec<NodeTypeName>,
    pub disallowed: Vec<NodeTypeName>,
}

impl NodeTypeCriteria {
    pub fn allowing(types: impl IntoIterator<Item = NodeTypeName>) -> Self {
        Self {
            allowed: types.into_iter().collect(),
            disallowed: Vec::new(),
        }
    }

    pub fn disallowing(mut self, types: impl IntoIterator<Item = NodeTypeName>) -> Self {
        self.disallowed.extend(types);
        self
    }

    /// An empty allow list allows everything not disallowed.
    pub fn matches(&self, node_type: &NodeTypeName, manager: &NodeTypeManager) -> bool {
        let allowed = self.allowed.is_empty()
            || self.allowed.iter().any(|t| manager.is_of_type(node_type, t.as_str()));
        allowed && !self.disallowed.iter().any(|t| manager.is_of_type(node_type, t.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub node_types: Option<NodeTypeCriteria>,
    pub search_term: Option<String>,
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_types(mut self, criteria: NodeTypeCriteria) -> Self {
        self.node_types = Some(criteria);
        self
    }

    pub fn search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn accepts(&self, node: &Node, manager: &NodeTypeManager) -> bool {
        self.node_types
            .as_ref()
            .is_none_or(|c| c.matches(&node.node_type_name, manager))
            && self
                .search_term
                .as_ref()
                .is_none_or(|term| node.properties.matches_search_term(term))
    }

    fn apply(&self, nodes: impl Iterator<Item = Node>, manager: &NodeTypeManager) -> Vec<Node> {
        let matching = nodes.filter(|n| self.accepts(n, manager));
        match self.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

/// A view of one content stream at one point.
///
/// Every query returns a fresh, finite result. Nodes hidden by the visibility
/// constraints do not exist for the subgraph, and neither do their descendants.
#[derive(Debug, Clone)]
pub struct ContentSubgraph<'a> {
    stream: Option<&'a ContentStreamGraph>,
    hierarchy: Option<&'a Hierarchy>,
    point: DimensionSpacePoint,
    visibility: VisibilityConstraints,
    node_types: &'a NodeTypeManager,
}

impl<'a> ContentSubgraph<'a> {
    pub(crate) fn new(
        stream: Option<&'a ContentStreamGraph>,
        point: DimensionSpacePoint,
        visibility: VisibilityConstraints,
        node_types: &'a NodeTypeManager,
    ) -> Self {
        let hierarchy = stream.and_then(|s| s.hierarchy(&point));
        Self {
            stream,
            hierarchy,
            point,
            visibility,
            node_types,
        }
    }

    pub fn dimension_space_point(&self) -> &DimensionSpacePoint {
        &self.point
    }

    pub fn find_node_by_id(&self, id: &NodeAggregateId) -> Option<Node> {
        let (stream, hierarchy) = (self.stream?, self.hierarchy?);
        let placement = hierarchy.nodes.value(id)?;
        let record = stream.aggregates.get(id)?;
        let variant = record.variants.get(&placement.origin_hash)?;

        let explicit: BTreeSet<SubtreeTag> = hierarchy.explicit_tags(id).into_iter().collect();
        let inherited = placement
            .tag_levels
            .keys()
            .filter(|t| !explicit.contains(*t))
            .cloned()
            .collect();
        let tags = NodeTags { explicit, inherited };
        if self.visibility.excludes(&tags) {
            return None;
        }

        Some(Node {
            aggregate_id: id.clone(),
            content_stream_id: stream.id().clone(),
            dimension_space_point: self.point.clone(),
            origin_dimension_space_point: variant.origin.clone(),
            node_type_name: record.node_type_name.clone(),
            name: record.node_name.clone(),
            classification: record.classification,
            properties: variant.properties.clone(),
            tags,
        })
    }

    pub fn find_root_node_by_type(&self, node_type_name: &NodeTypeName) -> Option<Node> {
        let hierarchy = self.hierarchy?;
        hierarchy
            .nodes
            .children(None)
            .into_iter()
            .filter_map(|id| self.find_node_by_id(id))
            .find(|n| &n.node_type_name == node_type_name)
    }

    pub fn find_child_nodes(&self, parent: &NodeAggregateId, filter: &NodeFilter) -> Vec<Node> {
        filter.apply(self.visible_children(parent).into_iter(), self.node_types)
    }

    pub fn count_child_nodes(&self, parent: &NodeAggregateId, filter: &NodeFilter) -> usize {
        self.find_child_nodes(parent, filter).len()
    }

    pub fn find_parent_node(&self, id: &NodeAggregateId) -> Option<Node> {
        self.find_node_by_id(id)?;
        let parent = self.hierarchy?.nodes.parent(id)?;
        self.find_node_by_id(parent)
    }

    /// Ancestors, nearest first.
    pub fn find_ancestor_nodes(&self, id: &NodeAggregateId, filter: &NodeFilter) -> Vec<Node> {
        let Some(hierarchy) = self.hierarchy else {
            return Vec::new();
        };
        if self.find_node_by_id(id).is_none() {
            return Vec::new();
        }
        let ancestors = hierarchy
            .nodes
            .ancestors(id)
            .into_iter()
            .filter_map(|a| self.find_node_by_id(a));
        filter.apply(ancestors, self.node_types)
    }

    /// Descendants in depth-first document order, excluding `id`.
    ///
    /// The filter selects results; traversal still passes through nodes it rejects.
    pub fn find_descendant_nodes(&self, id: &NodeAggregateId, filter: &NodeFilter) -> Vec<Node> {
        if self.find_node_by_id(id).is_none() {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut stack: Vec<Node> = self.visible_children(id).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if filter.limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
            let children = self.visible_children(&node.aggregate_id);
            stack.extend(children.into_iter().rev());
            if filter.accepts(&node, self.node_types) {
                out.push(node);
            }
        }
        out
    }

    /// Preceding siblings, nearest first.
    pub fn find_preceding_sibling_nodes(&self, id: &NodeAggregateId, filter: &NodeFilter) -> Vec<Node> {
        let Some(siblings) = self.sibling_ids(id) else {
            return Vec::new();
        };
        let position = siblings.iter().position(|s| *s == id).unwrap_or(0);
        let preceding = siblings[..position]
            .iter()
            .rev()
            .filter_map(|s| self.find_node_by_id(s));
        filter.apply(preceding, self.node_types)
    }

    pub fn find_succeeding_sibling_nodes(&self, id: &NodeAggregateId, filter: &NodeFilter) -> Vec<Node> {
        let Some(siblings) = self.sibling_ids(id) else {
            return Vec::new();
        };
        let position = siblings.iter().position(|s| *s == id).map_or(siblings.len(), |p| p + 1);
        let succeeding = siblings[position..]
            .iter()
            .filter_map(|s| self.find_node_by_id(s));
        filter.apply(succeeding, self.node_types)
    }

    /// Follow child names from `start`. The empty path yields `start` itself.
    pub fn find_node_by_path(&self, path: &NodePath, start: &NodeAggregateId) -> Option<Node> {
        let mut current = self.find_node_by_id(start)?;
        for segment in path.segments() {
            current = self.find_child_by_name(&current.aggregate_id, segment)?;
        }
        Some(current)
    }

    /// Names from the root down to `id`. Unnamed nodes end the path.
    pub fn find_node_path(&self, id: &NodeAggregateId) -> Option<NodePath> {
        let node = self.find_node_by_id(id)?;
        let mut names = Vec::new();
        let ancestors = self.find_ancestor_nodes(id, &NodeFilter::default());
        for n in ancestors.iter().rev().chain(std::iter::once(&node)) {
            if n.is_root() {
                continue;
            }
            names.push(n.name.clone()?);
        }
        Some(NodePath::new(names))
    }

    fn find_child_by_name(&self, parent: &NodeAggregateId, name: &NodeName) -> Option<Node> {
        self.visible_children(parent)
            .into_iter()
            .find(|n| n.name.as_ref() == Some(name))
    }

    fn visible_children(&self, parent: &NodeAggregateId) -> Vec<Node> {
        let Some(hierarchy) = self.hierarchy else {
            return Vec::new();
        };
        if !hierarchy.nodes.contains(parent) {
            return Vec::new();
        }
        hierarchy
            .nodes
            .children(Some(parent))
            .into_iter()
            .filter_map(|id| self.find_node_by_id(id))
            .collect()
    }

    fn sibling_ids(&self, id: &NodeAggregateId) -> Option<Vec<&'a NodeAggregateId>> {
        let hierarchy = self.hierarchy?;
        self.find_node_by_id(id)?;
        let parent = hierarchy.nodes.parent(id);
        Some(hierarchy.nodes.children(parent))
    }
}
