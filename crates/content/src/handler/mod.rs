//! Command handlers for node and dimension space commands.
//!
//! ```text
//! ContentCommand ──> handle(command, read model)
//!                      ├─ resolve workspace -> content stream + version
//!                      ├─ constraint checks against projected state
//!                      └─ EventsToPublish { ContentStream:<id>, events, Exact(version) }
//! ```
//!
//! Handlers never write. The expected version is the content stream version
//! the decision was based on, so a concurrent writer on the same stream makes
//! the later commit fail instead of interleaving.

mod constraints;
mod dimension;
mod node_aggregate;

use std::sync::Arc;

use escr_dimension::InterDimensionalVariationGraph;

use crate::node_type::NodeTypeManager;

pub use dimension::DimensionSpaceCommandHandler;

/// Handles every rebaseable node command.
#[derive(Debug, Clone)]
pub struct NodeAggregateCommandHandler {
    variation_graph: Arc<InterDimensionalVariationGraph>,
    node_types: Arc<NodeTypeManager>,
}

impl NodeAggregateCommandHandler {
    pub fn new(variation_graph: Arc<InterDimensionalVariationGraph>, node_types: Arc<NodeTypeManager>) -> Self {
        Self {
            variation_graph,
            node_types,
        }
    }

    pub fn variation_graph(&self) -> &InterDimensionalVariationGraph {
        &self.variation_graph
    }

    pub fn node_types(&self) -> &NodeTypeManager {
        &self.node_types
    }
}

#[cfg(test)]
mod tests {
    use escr_core::{DomainError, ExpectedVersion, NodeName, NodeTypeName, WorkspaceName};
    use escr_events::CommandHandler;

    use crate::commands::*;
    use crate::events::ContentEvent;
    use crate::graph::NodeFilter;
    use crate::node_path::NodePath;
    use crate::property::PropertyValues;
    use crate::test_support::*;
    use super::NodeAggregateCommandHandler;

    fn is_constraint(result: escr_core::DomainResult<Vec<ContentEvent>>) -> bool {
        matches!(result, Err(DomainError::ConstraintViolation(_)))
    }

    #[test]
    fn created_nodes_cover_specializations_of_their_origin() {
        let fixture = Fixture::with_pages();
        let de = fixture.subgraph("de");
        let gsw = fixture.subgraph("gsw");
        let en = fixture.subgraph("en");

        let children: Vec<_> = de
            .find_child_nodes(&id("site"), &NodeFilter::default())
            .into_iter()
            .map(|n| n.aggregate_id)
            .collect();
        assert_eq!(children, vec![id("home"), id("about")]);

        let news = gsw.find_node_by_id(&id("news")).unwrap();
        assert_eq!(news.origin_dimension_space_point, origin("de"));
        assert!(en.find_node_by_id(&id("news")).is_none());

        let by_path = de
            .find_node_by_path(&NodePath::parse("site/home/news").unwrap(), &id(ROOT))
            .unwrap();
        assert_eq!(by_path.aggregate_id, id("news"));
    }

    #[test]
    fn sibling_placement_is_respected() {
        let mut fixture = Fixture::with_pages();
        fixture
            .handle(ContentCommand::CreateNodeAggregateWithNode(CreateNodeAggregateWithNode {
                workspace_name: WorkspaceName::live(),
                node_aggregate_id: id("contact"),
                node_type_name: NodeTypeName::new("Acme:Page").unwrap(),
                origin_dimension_space_point: origin("de"),
                parent_node_aggregate_id: id("site"),
                succeeding_sibling_node_aggregate_id: Some(id("about")),
                node_name: None,
                initial_property_values: PropertyValues::new(),
            }))
            .unwrap();
        let subgraph = fixture.subgraph("gsw");
        let order: Vec<_> = subgraph
            .find_child_nodes(&id("site"), &NodeFilter::default())
            .into_iter()
            .map(|n| n.aggregate_id)
            .collect();
        assert_eq!(order, vec![id("home"), id("contact"), id("about")]);
        let preceding = subgraph.find_preceding_sibling_nodes(&id("about"), &NodeFilter::default());
        assert_eq!(preceding[0].aggregate_id, id("contact"));
    }

    #[test]
    fn creation_constraints_are_enforced() {
        let mut fixture = Fixture::with_pages();
        // Aggregate exists.
        assert!(is_constraint(fixture.create("home", "site", "Acme:Page", "de", None)));
        // Parent does not cover en.
        assert!(is_constraint(fixture.create("x", "site", "Acme:Page", "en", None)));
        // Root type only allows sites.
        assert!(is_constraint(fixture.create("x", ROOT, "Acme:Page", "de", None)));
        // Abstract type.
        assert!(is_constraint(fixture.create("x", "site", "Cms:Document", "de", None)));
        // Unknown parent.
        assert!(is_constraint(fixture.create("x", "missing", "Acme:Page", "de", None)));
        // Name taken below the same parent.
        assert!(is_constraint(fixture.create("x", "site", "Acme:Page", "de", Some("home"))));
    }

    #[test]
    fn handler_expects_the_projected_stream_version() {
        let fixture = Fixture::with_pages();
        let handler = NodeAggregateCommandHandler::new(
            std::sync::Arc::new(variation_graph()),
            fixture.node_types.clone(),
        );
        let version = fixture.graph().content_stream_version(&fixture.stream).unwrap();
        let command = ContentCommand::ChangeNodeAggregateName(ChangeNodeAggregateName {
            workspace_name: WorkspaceName::live(),
            node_aggregate_id: id("about"),
            new_node_name: NodeName::new("about-us").unwrap(),
        });
        let publish = handler.handle(&command, fixture.graph()).unwrap();
        assert_eq!(publish.expected_version, ExpectedVersion::Exact(version));
        assert_eq!(publish.stream_name.as_str(), "ContentStream:cs-live");
    }

    #[test]
    fn tagging_hides_the_subtree_and_untagging_restores_it() {
        let mut fixture = Fixture::with_pages();
        fixture.tag("home", "de").unwrap();
        for language in ["de", "gsw"] {
            let subgraph = fixture.subgraph(language);
            assert!(subgraph.find_node_by_id(&id("home")).is_none());
            assert!(subgraph.find_node_by_id(&id("news")).is_none());
            assert!(subgraph.find_node_by_id(&id("about")).is_some());
        }

        assert!(is_constraint(fixture.tag("home", "de")));
        // Inherited only.
        assert!(is_constraint(fixture.untag("news", "de")));

        fixture.untag("home", "de").unwrap();
        assert!(fixture.subgraph("gsw").find_node_by_id(&id("news")).is_some());
    }

    #[test]
    fn move_relinks_and_rejects_cycles() {
        let mut fixture = Fixture::with_pages();
        fixture.move_node("news", "about", "de").unwrap();
        let subgraph = fixture.subgraph("gsw");
        assert_eq!(
            subgraph.find_node_path(&id("news")).unwrap().to_string(),
            "site/about/news"
        );
        assert!(subgraph
            .find_child_nodes(&id("home"), &NodeFilter::default())
            .is_empty());

        assert!(is_constraint(fixture.move_node("about", "news", "de")));
        assert!(is_constraint(fixture.move_node("about", "about", "de")));
    }

    #[test]
    fn move_into_tagged_subtree_inherits_the_tag() {
        let mut fixture = Fixture::with_pages();
        fixture.tag("about", "de").unwrap();
        fixture.move_node("news", "about", "de").unwrap();
        assert!(fixture.subgraph("de").find_node_by_id(&id("news")).is_none());

        fixture.move_node("news", "home", "de").unwrap();
        assert!(fixture.subgraph("de").find_node_by_id(&id("news")).is_some());
    }

    #[test]
    fn properties_must_be_declared_but_can_always_be_unset() {
        let mut fixture = Fixture::with_pages();
        let set = |values: PropertyValues| {
            ContentCommand::SetNodeProperties(SetNodeProperties {
                workspace_name: WorkspaceName::live(),
                node_aggregate_id: id("home"),
                origin_dimension_space_point: origin("de"),
                property_values: values,
            })
        };
        fixture
            .handle(set(PropertyValues::new().with("title", "Home")))
            .unwrap();
        assert!(is_constraint(fixture.handle(set(PropertyValues::new().with("color", "red")))));
        fixture
            .handle(set(PropertyValues::new().with("color", serde_json::Value::Null)))
            .unwrap();

        let home = fixture.subgraph("gsw").find_node_by_id(&id("home")).unwrap();
        assert_eq!(home.properties.get_str("title"), Some("Home"));
    }

    #[test]
    fn variants_take_over_their_coverage() {
        let mut fixture = Fixture::with_pages();
        let variant = |node: &str, source: &str, target: &str| {
            ContentCommand::CreateNodeVariant(CreateNodeVariant {
                workspace_name: WorkspaceName::live(),
                node_aggregate_id: id(node),
                source_origin: origin(source),
                target_origin: origin(target),
            })
        };

        // Parent has no en variant yet.
        assert!(is_constraint(fixture.handle(variant("home", "de", "en"))));

        let events = fixture.handle(variant("site", "de", "en")).unwrap();
        assert!(matches!(events[0], ContentEvent::NodePeerVariantWasCreated(_)));
        fixture.handle(variant("home", "de", "en")).unwrap();
        let home = fixture.subgraph("en").find_node_by_id(&id("home")).unwrap();
        assert_eq!(home.origin_dimension_space_point, origin("en"));

        let events = fixture.handle(variant("home", "de", "gsw")).unwrap();
        assert!(matches!(events[0], ContentEvent::NodeSpecializationVariantWasCreated(_)));
        let home = fixture.subgraph("gsw").find_node_by_id(&id("home")).unwrap();
        assert_eq!(home.origin_dimension_space_point, origin("gsw"));
        // Children keep their position below the specialized variant.
        assert!(fixture.subgraph("gsw").find_node_by_id(&id("news")).is_some());

        assert!(is_constraint(fixture.handle(variant("home", "de", "gsw"))));
    }

    #[test]
    fn removal_takes_descendants_and_garbage_collects() {
        let mut fixture = Fixture::with_pages();
        fixture
            .handle(ContentCommand::RemoveNodeAggregate(RemoveNodeAggregate {
                workspace_name: WorkspaceName::live(),
                node_aggregate_id: id("home"),
                covered_dimension_space_point: point("de"),
                node_variant_selection_strategy: Default::default(),
            }))
            .unwrap();
        let graph = fixture.graph();
        assert!(graph.node_aggregate(&fixture.stream, &id("home")).is_none());
        assert!(graph.node_aggregate(&fixture.stream, &id("news")).is_none());
        assert!(fixture.subgraph("de").find_node_by_id(&id("about")).is_some());
    }

    #[test]
    fn removal_of_a_single_variant_keeps_the_rest() {
        let mut fixture = Fixture::with_pages();
        fixture
            .handle(ContentCommand::RemoveNodeAggregate(RemoveNodeAggregate {
                workspace_name: WorkspaceName::live(),
                node_aggregate_id: id("home"),
                covered_dimension_space_point: point("gsw"),
                node_variant_selection_strategy: escr_dimension::NodeVariantSelectionStrategy::OnlyGivenVariant,
            }))
            .unwrap();
        assert!(fixture.subgraph("gsw").find_node_by_id(&id("home")).is_none());
        assert!(fixture.subgraph("de").find_node_by_id(&id("news")).is_some());
        let home = fixture.graph().node_aggregate(&fixture.stream, &id("home")).unwrap();
        assert!(home.occupies(&origin("de")));
    }

    #[test]
    fn type_change_respects_child_constraints() {
        let mut fixture = Fixture::with_pages();
        let change = |strategy| {
            ContentCommand::ChangeNodeAggregateType(ChangeNodeAggregateType {
                workspace_name: WorkspaceName::live(),
                node_aggregate_id: id("home"),
                new_node_type_name: NodeTypeName::new("Acme:Text").unwrap(),
                strategy,
            })
        };
        assert!(is_constraint(fixture.handle(change(TypeChangeStrategy::HappyPath))));

        let events = fixture.handle(change(TypeChangeStrategy::Delete)).unwrap();
        assert!(matches!(events[0], ContentEvent::NodeAggregateWasRemoved(_)));
        assert!(matches!(events[1], ContentEvent::NodeAggregateTypeWasChanged(_)));
        let home = fixture.subgraph("de").find_node_by_id(&id("home")).unwrap();
        assert_eq!(home.node_type_name.as_str(), "Acme:Text");
        assert!(fixture.subgraph("de").find_node_by_id(&id("news")).is_none());
    }

    #[test]
    fn shine_through_requires_an_unused_specialization() {
        let mut fixture = Fixture::with_pages();
        let result = fixture.handle(ContentCommand::AddDimensionShineThrough(AddDimensionShineThrough {
            workspace_name: WorkspaceName::live(),
            source: point("de"),
            target: point("gsw"),
        }));
        assert!(is_constraint(result));

        let result = fixture.handle(ContentCommand::AddDimensionShineThrough(AddDimensionShineThrough {
            workspace_name: WorkspaceName::live(),
            source: point("de"),
            target: point("en"),
        }));
        assert!(is_constraint(result));
    }

    #[test]
    fn commands_against_unknown_workspaces_are_rejected() {
        let mut fixture = Fixture::new();
        let result = fixture.handle(ContentCommand::TagSubtree(TagSubtree {
            workspace_name: WorkspaceName::new("nobody").unwrap(),
            node_aggregate_id: id(ROOT),
            covered_dimension_space_point: point("de"),
            node_variant_selection_strategy: Default::default(),
            tag: crate::subtree_tag::SubtreeTag::disabled(),
        }));
        assert!(is_constraint(result));
    }
}
