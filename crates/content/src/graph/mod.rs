//! The content graph: workspaces, content streams and per-point node forests.
//!
//! ```text
//! ContentGraph
//!   workspaces: name -> current content stream
//!   content_streams: id -> ContentStreamGraph
//!        aggregates:  node aggregate id -> { type, name, variants by origin hash }
//!        hierarchies: dimension space point hash -> SiblingList<node aggregate id, Placement>
//! ```
//!
//! A node is visible at a point iff its aggregate has a [`Placement`] in that
//! point's hierarchy; the placement names the origin whose variant is shown
//! there and carries the per-tag disable levels.

mod aggregate;
mod apply;
pub mod sibling_list;
mod subgraph;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use escr_core::{ContentStreamId, NodeAggregateId, NodeName, NodeTypeName, WorkspaceName};
use escr_dimension::{
    DimensionSpacePoint, DimensionSpacePointHash, DimensionSpacePointSet, OriginDimensionSpacePoint,
};

use crate::node::NodeAggregateClassification;
use crate::node_type::NodeTypeManager;
use crate::property::PropertyValues;
use crate::subtree_tag::SubtreeTag;

pub use aggregate::{NodeAggregate, NodeVariant};
pub use sibling_list::SiblingList;
pub use subgraph::{ContentSubgraph, NodeFilter, NodeTypeCriteria, VisibilityConstraints};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: WorkspaceName,
    pub base_workspace_name: Option<WorkspaceName>,
    pub current_content_stream_id: ContentStreamId,
}

impl Workspace {
    pub fn is_root(&self) -> bool {
        self.base_workspace_name.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeRecord {
    pub(crate) origin: OriginDimensionSpacePoint,
    pub(crate) properties: PropertyValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AggregateRecord {
    pub(crate) node_type_name: NodeTypeName,
    pub(crate) classification: NodeAggregateClassification,
    pub(crate) node_name: Option<NodeName>,
    pub(crate) variants: BTreeMap<DimensionSpacePointHash, NodeRecord>,
}

/// A node's place in one point's hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placement {
    pub(crate) origin_hash: DimensionSpacePointHash,
    /// Only non-zero levels are stored.
    pub(crate) tag_levels: BTreeMap<SubtreeTag, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hierarchy {
    pub(crate) point: DimensionSpacePoint,
    pub(crate) nodes: SiblingList<NodeAggregateId, Placement>,
}

impl Hierarchy {
    fn new(point: DimensionSpacePoint) -> Self {
        Self {
            point,
            nodes: SiblingList::new(),
        }
    }

    pub(crate) fn levels(&self, id: &NodeAggregateId) -> BTreeMap<SubtreeTag, u32> {
        self.nodes
            .value(id)
            .map(|p| p.tag_levels.clone())
            .unwrap_or_default()
    }

    fn parent_levels(&self, id: &NodeAggregateId) -> BTreeMap<SubtreeTag, u32> {
        self.nodes
            .parent(id)
            .map(|parent| self.levels(parent))
            .unwrap_or_default()
    }

    /// Tags set on `id` itself rather than inherited from its parent.
    pub(crate) fn explicit_tags(&self, id: &NodeAggregateId) -> Vec<SubtreeTag> {
        let own = self.levels(id);
        let parent = self.parent_levels(id);
        own.into_iter()
            .filter(|(tag, level)| *level > parent.get(tag).copied().unwrap_or(0))
            .map(|(tag, _)| tag)
            .collect()
    }

    pub(crate) fn is_explicitly_tagged(&self, id: &NodeAggregateId, tag: &SubtreeTag) -> bool {
        let own = self.levels(id).get(tag).copied().unwrap_or(0);
        let parent = self.parent_levels(id).get(tag).copied().unwrap_or(0);
        own > parent
    }

    /// Add `delta` to `tag`'s level on `id` and every descendant.
    fn shift_levels(&mut self, id: &NodeAggregateId, tag: &SubtreeTag, delta: i64) {
        if delta == 0 {
            return;
        }
        for key in self.nodes.subtree(id) {
            if let Some(placement) = self.nodes.value_mut(&key) {
                let current = placement.tag_levels.get(tag).copied().unwrap_or(0) as i64;
                let next = (current + delta).max(0) as u32;
                if next == 0 {
                    placement.tag_levels.remove(tag);
                } else {
                    placement.tag_levels.insert(tag.clone(), next);
                }
            }
        }
    }
}

/// Projected state of one content stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStreamGraph {
    id: ContentStreamId,
    source: Option<ContentStreamId>,
    version: u64,
    pub(crate) aggregates: BTreeMap<NodeAggregateId, AggregateRecord>,
    pub(crate) hierarchies: BTreeMap<DimensionSpacePointHash, Hierarchy>,
}

impl ContentStreamGraph {
    fn new(id: ContentStreamId, source: Option<ContentStreamId>, version: u64) -> Self {
        Self {
            id,
            source,
            version,
            aggregates: BTreeMap::new(),
            hierarchies: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &ContentStreamId {
        &self.id
    }

    /// The stream this one was forked from.
    pub fn source(&self) -> Option<&ContentStreamId> {
        self.source.as_ref()
    }

    /// Version of the last applied event of this stream.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node_aggregate_count(&self) -> usize {
        self.aggregates.len()
    }

    pub(crate) fn hierarchy(&self, point: &DimensionSpacePoint) -> Option<&Hierarchy> {
        self.hierarchies.get(point.hash())
    }

    fn hierarchy_mut(&mut self, point: &DimensionSpacePoint) -> &mut Hierarchy {
        self.hierarchies
            .entry(point.hash().clone())
            .or_insert_with(|| Hierarchy::new(point.clone()))
    }

    /// Points with at least one node.
    pub fn used_dimension_space_points(&self) -> DimensionSpacePointSet {
        self.hierarchies
            .values()
            .filter(|h| !h.nodes.is_empty())
            .map(|h| h.point.clone())
            .collect()
    }

    pub fn parent_id(&self, id: &NodeAggregateId, point: &DimensionSpacePoint) -> Option<&NodeAggregateId> {
        self.hierarchy(point).and_then(|h| h.nodes.parent(id))
    }

    pub fn succeeding_sibling_id(
        &self,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Option<&NodeAggregateId> {
        self.hierarchy(point)
            .and_then(|h| h.nodes.get(id))
            .and_then(|e| e.succeeding.as_ref())
    }

    pub fn child_ids(&self, parent: &NodeAggregateId, point: &DimensionSpacePoint) -> Vec<&NodeAggregateId> {
        self.hierarchy(point)
            .map(|h| h.nodes.children(Some(parent)))
            .unwrap_or_default()
    }

    /// Whether `ancestor` is `id` or above it at `point`.
    pub fn is_ancestor_or_self(
        &self,
        ancestor: &NodeAggregateId,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> bool {
        self.hierarchy(point)
            .is_some_and(|h| h.nodes.contains(id) && h.nodes.is_ancestor_or_self(ancestor, id))
    }
}

/// The whole projected content graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentGraph {
    workspaces: BTreeMap<WorkspaceName, Workspace>,
    content_streams: BTreeMap<ContentStreamId, ContentStreamGraph>,
}

impl ContentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.workspaces.clear();
        self.content_streams.clear();
    }

    pub fn workspace(&self, name: &WorkspaceName) -> Option<&Workspace> {
        self.workspaces.get(name)
    }

    pub fn workspaces(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.values()
    }

    pub fn content_stream(&self, id: &ContentStreamId) -> Option<&ContentStreamGraph> {
        self.content_streams.get(id)
    }

    pub fn content_stream_ids(&self) -> impl Iterator<Item = &ContentStreamId> {
        self.content_streams.keys()
    }

    pub fn content_stream_version(&self, id: &ContentStreamId) -> Option<u64> {
        self.content_streams.get(id).map(ContentStreamGraph::version)
    }

    /// Content stream a workspace currently points at.
    pub fn workspace_content_stream(&self, name: &WorkspaceName) -> Option<&ContentStreamGraph> {
        self.workspace(name)
            .and_then(|w| self.content_streams.get(&w.current_content_stream_id))
    }

    pub fn node_aggregate(&self, content_stream_id: &ContentStreamId, id: &NodeAggregateId) -> Option<NodeAggregate> {
        self.content_stream(content_stream_id)
            .and_then(|stream| stream.node_aggregate(id))
    }

    /// Query a workspace at one point. Unknown workspaces yield an empty subgraph.
    pub fn subgraph<'a>(
        &'a self,
        workspace_name: &WorkspaceName,
        point: &DimensionSpacePoint,
        visibility: VisibilityConstraints,
        node_types: &'a NodeTypeManager,
    ) -> ContentSubgraph<'a> {
        ContentSubgraph::new(
            self.workspace_content_stream(workspace_name),
            point.clone(),
            visibility,
            node_types,
        )
    }

    pub fn subgraph_for_content_stream<'a>(
        &'a self,
        content_stream_id: &ContentStreamId,
        point: &DimensionSpacePoint,
        visibility: VisibilityConstraints,
        node_types: &'a NodeTypeManager,
    ) -> ContentSubgraph<'a> {
        ContentSubgraph::new(
            self.content_stream(content_stream_id),
            point.clone(),
            visibility,
            node_types,
        )
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use escr_core::{NodeTypeName, WorkspaceName};
    use escr_dimension::NodeVariantSelectionStrategy;

    use super::*;
    use crate::commands::*;
    use crate::events::*;
    use crate::property::PropertyValues;
    use crate::subtree_tag::SubtreeTag;
    use crate::test_support::*;

    const NODES: [&str; 4] = ["site", "home", "about", "news"];
    const LANGUAGES: [&str; 3] = ["de", "gsw", "en"];

    #[derive(Debug, Clone)]
    enum Op {
        Tag(usize, usize),
        Untag(usize, usize),
        Move(usize, usize, usize, bool),
        Variant(usize, usize),
        Remove(usize, usize),
        SetTitle(usize, usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize, 0..3usize).prop_map(|(n, l)| Op::Tag(n, l)),
            (0..4usize, 0..3usize).prop_map(|(n, l)| Op::Untag(n, l)),
            (0..4usize, 0..4usize, 0..3usize, any::<bool>()).prop_map(|(n, p, l, s)| Op::Move(n, p, l, s)),
            (0..4usize, 0..3usize).prop_map(|(n, l)| Op::Variant(n, l)),
            (0..4usize, 0..3usize).prop_map(|(n, l)| Op::Remove(n, l)),
            (0..4usize, 0..3usize).prop_map(|(n, l)| Op::SetTitle(n, l)),
        ]
    }

    fn command(op: &Op) -> ContentCommand {
        let live = WorkspaceName::live();
        match *op {
            Op::Tag(n, l) => ContentCommand::TagSubtree(TagSubtree {
                workspace_name: live,
                node_aggregate_id: id(NODES[n]),
                covered_dimension_space_point: point(LANGUAGES[l]),
                node_variant_selection_strategy: NodeVariantSelectionStrategy::AllSpecializations,
                tag: SubtreeTag::disabled(),
            }),
            Op::Untag(n, l) => ContentCommand::UntagSubtree(UntagSubtree {
                workspace_name: live,
                node_aggregate_id: id(NODES[n]),
                covered_dimension_space_point: point(LANGUAGES[l]),
                node_variant_selection_strategy: NodeVariantSelectionStrategy::AllSpecializations,
                tag: SubtreeTag::disabled(),
            }),
            Op::Move(n, p, l, scatter) => ContentCommand::MoveNodeAggregate(MoveNodeAggregate {
                workspace_name: live,
                dimension_space_point: point(LANGUAGES[l]),
                node_aggregate_id: id(NODES[n]),
                new_parent_node_aggregate_id: Some(id(NODES[p])),
                new_succeeding_sibling_node_aggregate_id: None,
                relation_distribution_strategy: if scatter {
                    RelationDistributionStrategy::Scatter
                } else {
                    RelationDistributionStrategy::GatherAll
                },
            }),
            Op::Variant(n, l) => ContentCommand::CreateNodeVariant(CreateNodeVariant {
                workspace_name: live,
                node_aggregate_id: id(NODES[n]),
                source_origin: origin("de"),
                target_origin: origin(LANGUAGES[l]),
            }),
            Op::Remove(n, l) => ContentCommand::RemoveNodeAggregate(RemoveNodeAggregate {
                workspace_name: live,
                node_aggregate_id: id(NODES[n]),
                covered_dimension_space_point: point(LANGUAGES[l]),
                node_variant_selection_strategy: NodeVariantSelectionStrategy::OnlyGivenVariant,
            }),
            Op::SetTitle(n, l) => ContentCommand::SetNodeProperties(SetNodeProperties {
                workspace_name: live,
                node_aggregate_id: id(NODES[n]),
                origin_dimension_space_point: origin(LANGUAGES[l]),
                property_values: PropertyValues::new().with("title", format!("{n}-{l}")),
            }),
        }
    }

    /// Runs every op; rejected commands leave no trace.
    fn run(ops: &[Op]) -> Fixture {
        let mut fixture = Fixture::with_pages();
        for op in ops {
            let _ = fixture.handle(command(op));
        }
        fixture
    }

    fn stream(fixture: &Fixture) -> &ContentStreamGraph {
        fixture.graph().content_stream(&fixture.stream).unwrap()
    }

    fn same_content(a: &ContentStreamGraph, b: &ContentStreamGraph) -> bool {
        a.aggregates == b.aggregates && a.hierarchies == b.hierarchies
    }

    #[test]
    fn fork_copies_state_and_removal_drops_it() {
        let mut fixture = Fixture::with_pages();
        let fork = escr_core::ContentStreamId::new("cs-fork").unwrap();
        fixture
            .simulator
            .apply_unrecorded(&[ContentEvent::ContentStreamWasForked(ContentStreamWasForked {
                new_content_stream_id: fork.clone(),
                source_content_stream_id: fixture.stream.clone(),
                version_of_source: 5,
            })])
            .unwrap();
        let graph = fixture.graph();
        let copy = graph.content_stream(&fork).unwrap();
        assert_eq!(copy.source(), Some(&fixture.stream));
        assert!(same_content(copy, stream(&fixture)));

        fixture
            .simulator
            .apply_unrecorded(&[ContentEvent::ContentStreamWasRemoved(ContentStreamWasRemoved {
                content_stream_id: fork.clone(),
            })])
            .unwrap();
        assert!(fixture.graph().content_stream(&fork).is_none());
    }

    #[test]
    fn moved_dimension_space_point_carries_its_content() {
        let mut graph = Fixture::with_pages().graph().clone();
        let stream_id = escr_core::ContentStreamId::new("cs-live").unwrap();
        graph.apply_event(
            &ContentEvent::DimensionSpacePointWasMoved(DimensionSpacePointWasMoved {
                workspace_name: WorkspaceName::live(),
                content_stream_id: stream_id.clone(),
                source: point("gsw"),
                target: point("fr"),
            }),
            99,
        );
        let stream = graph.content_stream(&stream_id).unwrap();
        assert_eq!(stream.version(), 99);
        assert!(stream.hierarchy(&point("gsw")).is_none());
        let moved = stream.hierarchy(&point("fr")).unwrap();
        assert!(moved.nodes.contains(&id("news")));
        assert!(stream.used_dimension_space_points().contains(&point("fr")));
    }

    #[test]
    fn shine_through_copies_the_generalization() {
        let mut graph = Fixture::with_pages().graph().clone();
        let stream_id = escr_core::ContentStreamId::new("cs-live").unwrap();
        graph.apply_event(
            &ContentEvent::DimensionShineThroughWasAdded(DimensionShineThroughWasAdded {
                workspace_name: WorkspaceName::live(),
                content_stream_id: stream_id.clone(),
                source: point("de"),
                target: point("de_ch"),
            }),
            99,
        );
        let stream = graph.content_stream(&stream_id).unwrap();
        let copied = stream.hierarchy(&point("de_ch")).unwrap();
        assert_eq!(copied.point, point("de_ch"));
        assert_eq!(copied.nodes, stream.hierarchy(&point("de")).unwrap().nodes);
    }

    #[test]
    fn node_aggregate_reports_coverage_and_tags() {
        let mut fixture = Fixture::with_pages();
        fixture.tag("home", "gsw").unwrap();
        let home = fixture.graph().node_aggregate(&fixture.stream, &id("home")).unwrap();
        assert_eq!(home.node_type_name(), &NodeTypeName::new("Acme:Page").unwrap());
        assert!(home.covers(&point("de")));
        assert!(!home.covers(&point("en")));
        assert!(home.is_explicitly_tagged(&SubtreeTag::disabled(), &point("gsw")));
        assert!(!home.is_explicitly_tagged(&SubtreeTag::disabled(), &point("de")));
        let tagged: Vec<_> = home.points_tagged_with(&SubtreeTag::disabled()).iter().cloned().collect();
        assert_eq!(tagged, vec![point("gsw")]);

        let news = fixture.graph().node_aggregate(&fixture.stream, &id("news")).unwrap();
        assert!(!news.is_explicitly_tagged(&SubtreeTag::disabled(), &point("gsw")));
    }

    #[test]
    fn variant_into_a_covered_point_replaces_the_placement() {
        let mut fixture = Fixture::with_pages();
        fixture.tag("home", "gsw").unwrap();
        fixture
            .handle(ContentCommand::CreateNodeVariant(CreateNodeVariant {
                workspace_name: WorkspaceName::live(),
                node_aggregate_id: id("news"),
                source_origin: origin("de"),
                target_origin: origin("gsw"),
            }))
            .unwrap();

        let stream = stream(&fixture);
        assert_eq!(stream.child_ids(&id("home"), &point("gsw")), vec![&id("news")]);
        let gsw = stream.hierarchy(&point("gsw")).unwrap();
        let placement = gsw.nodes.value(&id("news")).unwrap();
        assert_eq!(&placement.origin_hash, origin("gsw").hash());
        assert_eq!(placement.tag_levels.get(&SubtreeTag::disabled()), Some(&1));
        let de = stream.hierarchy(&point("de")).unwrap();
        assert_eq!(&de.nodes.value(&id("news")).unwrap().origin_hash, origin("de").hash());

        let news = fixture.graph().node_aggregate(&fixture.stream, &id("news")).unwrap();
        assert_eq!(news.variants().count(), 2);
        assert_eq!(news.covered_by_origin(&origin("de")), DimensionSpacePointSet::single(point("de")));
        assert_eq!(news.covered_by_origin(&origin("gsw")), DimensionSpacePointSet::single(point("gsw")));
        assert!(same_content(stream, fixture.replay().content_stream(&fixture.stream).unwrap()));
    }

    #[test]
    fn root_dimension_updates_replace_the_covered_points() {
        let mut fixture = Fixture::with_pages();
        fixture.create("local", "site", "Acme:Page", "gsw", Some("local")).unwrap();
        let mut graph = fixture.graph().clone();
        let stream_id = fixture.stream.clone();
        let update = |points: &[&str]| {
            ContentEvent::RootNodeAggregateDimensionsWereUpdated(RootNodeAggregateDimensionsWereUpdated {
                workspace_name: WorkspaceName::live(),
                content_stream_id: stream_id.clone(),
                node_aggregate_id: id(ROOT),
                covered_dimension_space_points: points.iter().map(|p| point(p)).collect(),
            })
        };

        graph.apply_event(&update(&["de", "en"]), 99);
        let stream = graph.content_stream(&stream_id).unwrap();
        assert!(stream.hierarchy(&point("gsw")).is_none_or(|h| h.nodes.is_empty()));
        assert!(stream.hierarchy(&point("de")).unwrap().nodes.contains(&id("news")));
        assert!(stream.hierarchy(&point("en")).unwrap().nodes.contains(&id(ROOT)));
        assert!(graph.node_aggregate(&stream_id, &id("local")).is_none());
        let news = graph.node_aggregate(&stream_id, &id("news")).unwrap();
        assert!(!news.covers(&point("gsw")));
        assert!(graph.node_aggregate(&stream_id, &id(ROOT)).is_some());

        graph.apply_event(&update(&["de", "gsw", "en"]), 100);
        let stream = graph.content_stream(&stream_id).unwrap();
        assert_eq!(stream.child_ids(&id(ROOT), &point("gsw")), Vec::<&NodeAggregateId>::new());
        assert!(stream.hierarchy(&point("gsw")).unwrap().nodes.contains(&id(ROOT)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        #[test]
        fn replay_matches_incremental_projection(ops in proptest::collection::vec(op(), 0..24)) {
            let fixture = run(&ops);
            prop_assert_eq!(&fixture.replay(), fixture.graph());
        }

        #[test]
        fn tag_levels_follow_parents(ops in proptest::collection::vec(op(), 0..24)) {
            let fixture = run(&ops);
            let stream = stream(&fixture);
            for hierarchy in stream.hierarchies.values() {
                for key in hierarchy.nodes.keys() {
                    let own = hierarchy.levels(key);
                    let parent = hierarchy.parent_levels(key);
                    for (tag, level) in &own {
                        let inherited = parent.get(tag).copied().unwrap_or(0);
                        prop_assert!(*level == inherited || *level == inherited + 1);
                    }
                    for tag in parent.keys() {
                        prop_assert!(own.contains_key(tag), "{key} lost inherited tag {tag}");
                    }
                }
            }
        }

        #[test]
        fn placements_reference_existing_variants(ops in proptest::collection::vec(op(), 0..24)) {
            let fixture = run(&ops);
            let stream = stream(&fixture);
            for hierarchy in stream.hierarchies.values() {
                for key in hierarchy.nodes.keys() {
                    let placement = hierarchy.nodes.value(key).unwrap();
                    let record = stream.aggregates.get(key);
                    prop_assert!(record.is_some_and(|r| r.variants.contains_key(&placement.origin_hash)));
                }
            }
            for record in stream.aggregates.values() {
                prop_assert!(!record.variants.is_empty());
            }
        }

        #[test]
        fn tag_then_untag_is_a_no_op(
            ops in proptest::collection::vec(op(), 0..16),
            node in 0..4usize,
            language in 0..3usize,
        ) {
            let mut fixture = run(&ops);
            let before = stream(&fixture).clone();
            let tag = |c: bool| {
                let (node_id, at) = (id(NODES[node]), point(LANGUAGES[language]));
                if c {
                    ContentCommand::TagSubtree(TagSubtree {
                        workspace_name: WorkspaceName::live(),
                        node_aggregate_id: node_id,
                        covered_dimension_space_point: at,
                        node_variant_selection_strategy: NodeVariantSelectionStrategy::OnlyGivenVariant,
                        tag: SubtreeTag::new("review").unwrap(),
                    })
                } else {
                    ContentCommand::UntagSubtree(UntagSubtree {
                        workspace_name: WorkspaceName::live(),
                        node_aggregate_id: node_id,
                        covered_dimension_space_point: at,
                        node_variant_selection_strategy: NodeVariantSelectionStrategy::OnlyGivenVariant,
                        tag: SubtreeTag::new("review").unwrap(),
                    })
                }
            };
            if fixture.handle(tag(true)).is_ok() {
                fixture.handle(tag(false)).unwrap();
                prop_assert!(same_content(&before, stream(&fixture)));
            }
        }
    }
}
