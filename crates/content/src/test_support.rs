//! Shared fixture: a two-language repository driven through the simulator.

use std::sync::Arc;

use escr_core::{ContentStreamId, DomainResult, NodeAggregateId, NodeName, NodeTypeName, WorkspaceName};
use escr_dimension::{
    ContentDimensionConfig, ContentDimensionSource, ContentDimensionValueConfig, DimensionSpacePoint,
    InterDimensionalVariationGraph, OriginDimensionSpacePoint,
};

use crate::commands::*;
use crate::events::*;
use crate::graph::{ContentGraph, ContentSubgraph, VisibilityConstraints};
use crate::handler::{DimensionSpaceCommandHandler, NodeAggregateCommandHandler};
use crate::node_type::{self, NodeTypeManager};
use crate::property::PropertyValues;
use crate::simulator::CommandSimulator;

pub(crate) const ROOT: &str = "sites";

pub(crate) fn id(value: &str) -> NodeAggregateId {
    NodeAggregateId::new(value).unwrap()
}

pub(crate) fn point(language: &str) -> DimensionSpacePoint {
    DimensionSpacePoint::from_pairs([("language", language)])
}

pub(crate) fn origin(language: &str) -> OriginDimensionSpacePoint {
    OriginDimensionSpacePoint::new(point(language))
}

pub(crate) fn variation_graph() -> InterDimensionalVariationGraph {
    let source = ContentDimensionSource::from_config(&[ContentDimensionConfig {
        id: "language".to_string(),
        values: vec![
            ContentDimensionValueConfig::with_specializations(
                "de",
                vec![ContentDimensionValueConfig::leaf("gsw")],
            ),
            ContentDimensionValueConfig::leaf("en"),
        ],
    }])
    .unwrap();
    InterDimensionalVariationGraph::new(source)
}

/// Creates `stream` and makes it the live workspace's content stream.
pub(crate) fn bootstrap(stream: &ContentStreamId) -> Vec<ContentEvent> {
    vec![
        ContentEvent::ContentStreamWasCreated(ContentStreamWasCreated {
            content_stream_id: stream.clone(),
        }),
        ContentEvent::RootWorkspaceWasCreated(RootWorkspaceWasCreated {
            workspace_name: WorkspaceName::live(),
            new_content_stream_id: stream.clone(),
        }),
    ]
}

pub(crate) struct Fixture {
    pub(crate) simulator: CommandSimulator,
    pub(crate) node_types: Arc<NodeTypeManager>,
    pub(crate) stream: ContentStreamId,
}

impl Fixture {
    /// Live workspace with a `Cms:Sites` root node called `sites`.
    pub(crate) fn new() -> Self {
        let graph = Arc::new(variation_graph());
        let node_types = Arc::new(node_type::tests::sample_manager());
        let stream = ContentStreamId::new("cs-live").unwrap();
        let mut simulator = CommandSimulator::new(
            NodeAggregateCommandHandler::new(graph.clone(), node_types.clone()),
            DimensionSpaceCommandHandler::new(graph),
            ContentGraph::new(),
        );
        simulator.apply_unrecorded(&bootstrap(&stream)).unwrap();
        let mut fixture = Self {
            simulator,
            node_types,
            stream,
        };
        fixture
            .handle(ContentCommand::CreateRootNodeAggregateWithNode(
                CreateRootNodeAggregateWithNode {
                    workspace_name: WorkspaceName::live(),
                    node_aggregate_id: id(ROOT),
                    node_type_name: NodeTypeName::new(node_type::well_known::SITES).unwrap(),
                },
            ))
            .unwrap();
        fixture
    }

    pub(crate) fn handle(&mut self, command: ContentCommand) -> DomainResult<Vec<ContentEvent>> {
        self.simulator
            .handle(&command)
            .map(|commit| commit.events.events.clone())
    }

    /// A fresh graph built from the recorded events alone.
    pub(crate) fn replay(&self) -> ContentGraph {
        let graph = Arc::new(variation_graph());
        let mut replay = CommandSimulator::new(
            NodeAggregateCommandHandler::new(graph.clone(), self.node_types.clone()),
            DimensionSpaceCommandHandler::new(graph),
            ContentGraph::new(),
        );
        replay.apply_unrecorded(&bootstrap(&self.stream)).unwrap();
        for commit in self.simulator.commits() {
            replay.apply_unrecorded(&commit.events.events).unwrap();
        }
        replay.graph().clone()
    }

    pub(crate) fn graph(&self) -> &ContentGraph {
        self.simulator.graph()
    }

    pub(crate) fn subgraph(&self, language: &str) -> ContentSubgraph<'_> {
        self.graph().subgraph(
            &WorkspaceName::live(),
            &point(language),
            VisibilityConstraints::default(),
            &self.node_types,
        )
    }

    pub(crate) fn create(
        &mut self,
        node: &str,
        parent: &str,
        node_type: &str,
        language: &str,
        name: Option<&str>,
    ) -> DomainResult<Vec<ContentEvent>> {
        self.handle(ContentCommand::CreateNodeAggregateWithNode(CreateNodeAggregateWithNode {
            workspace_name: WorkspaceName::live(),
            node_aggregate_id: id(node),
            node_type_name: NodeTypeName::new(node_type).unwrap(),
            origin_dimension_space_point: origin(language),
            parent_node_aggregate_id: id(parent),
            succeeding_sibling_node_aggregate_id: None,
            node_name: name.map(|n| NodeName::new(n).unwrap()),
            initial_property_values: PropertyValues::new(),
        }))
    }

    /// `sites / site / {home, about}` with `home / news`, all created in `de`.
    pub(crate) fn with_pages() -> Self {
        let mut fixture = Self::new();
        fixture.create("site", ROOT, node_type::well_known::SITE, "de", Some("site")).unwrap();
        fixture.create("home", "site", "Acme:Page", "de", Some("home")).unwrap();
        fixture.create("about", "site", "Acme:Page", "de", Some("about")).unwrap();
        fixture.create("news", "home", "Acme:Page", "de", Some("news")).unwrap();
        fixture
    }

    pub(crate) fn tag(&mut self, node: &str, language: &str) -> DomainResult<Vec<ContentEvent>> {
        self.handle(ContentCommand::TagSubtree(TagSubtree {
            workspace_name: WorkspaceName::live(),
            node_aggregate_id: id(node),
            covered_dimension_space_point: point(language),
            node_variant_selection_strategy: Default::default(),
            tag: crate::subtree_tag::SubtreeTag::disabled(),
        }))
    }

    pub(crate) fn untag(&mut self, node: &str, language: &str) -> DomainResult<Vec<ContentEvent>> {
        self.handle(ContentCommand::UntagSubtree(UntagSubtree {
            workspace_name: WorkspaceName::live(),
            node_aggregate_id: id(node),
            covered_dimension_space_point: point(language),
            node_variant_selection_strategy: Default::default(),
            tag: crate::subtree_tag::SubtreeTag::disabled(),
        }))
    }

    pub(crate) fn move_node(&mut self, node: &str, new_parent: &str, language: &str) -> DomainResult<Vec<ContentEvent>> {
        self.handle(ContentCommand::MoveNodeAggregate(MoveNodeAggregate {
            workspace_name: WorkspaceName::live(),
            dimension_space_point: point(language),
            node_aggregate_id: id(node),
            new_parent_node_aggregate_id: Some(id(new_parent)),
            new_succeeding_sibling_node_aggregate_id: None,
            relation_distribution_strategy: RelationDistributionStrategy::GatherAll,
        }))
    }
}
