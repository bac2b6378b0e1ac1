//! Shared fixture: a two-language repository with a small site node type set.

use escr_content::commands::*;
use escr_content::{ContentCommand, PropertyValues};
use escr_core::{ContentStreamId, NodeAggregateId, NodeName, NodeTypeName, WorkspaceName};
use escr_dimension::{DimensionSpacePoint, OriginDimensionSpacePoint};
use escr_observability::LogConfig;

use crate::config::ContentRepositoryConfig;
use crate::content_repository::{ContentRepository, ContentRepositoryBuilder};

pub(crate) const CONFIG: &str = r#"{
    "id": "default",
    "dimensions": [
        {
            "id": "language",
            "values": [
                { "value": "de", "specializations": [{ "value": "gsw" }] },
                { "value": "en" }
            ]
        }
    ],
    "nodeTypes": {
        "Cms:Sites": { "root": true, "childConstraints": { "*": false, "Cms:Site": true } },
        "Cms:Document": {
            "abstract": true,
            "properties": { "title": {}, "uriPathSegment": {} }
        },
        "Cms:Site": { "superTypes": ["Cms:Document"] },
        "Cms:Shortcut": {
            "superTypes": ["Cms:Document"],
            "properties": { "target": {}, "targetMode": {} }
        },
        "Acme:Page": { "superTypes": ["Cms:Document"] },
        "Acme:Text": { "properties": { "text": {} }, "childConstraints": { "*": false } }
    }
}"#;

pub(crate) fn config() -> ContentRepositoryConfig {
    ContentRepositoryConfig::from_json_str(CONFIG).unwrap()
}

/// An in-memory repository, set up and ready for commands.
pub(crate) fn repository() -> ContentRepository {
    init_logging();
    let repository = ContentRepositoryBuilder::new(config()).build().unwrap();
    repository.setup().unwrap();
    repository
}

/// [`repository`] with a live workspace holding [`site_commands`].
pub(crate) fn repository_with_site() -> ContentRepository {
    let repository = repository();
    repository.handle(&create_root_workspace("cs-live")).unwrap();
    for command in site_commands(&WorkspaceName::live()) {
        repository.handle(&command).unwrap();
    }
    repository
}

/// Warnings and errors only; rejected commands are expected in tests.
pub(crate) fn init_logging() {
    let config = LogConfig {
        filter: "warn".to_string(),
        ..LogConfig::default()
    };
    let _ = escr_observability::init_with(&config);
}

pub(crate) fn id(value: &str) -> NodeAggregateId {
    NodeAggregateId::new(value).unwrap()
}

pub(crate) fn stream(value: &str) -> ContentStreamId {
    ContentStreamId::new(value).unwrap()
}

pub(crate) fn workspace(value: &str) -> WorkspaceName {
    WorkspaceName::new(value).unwrap()
}

pub(crate) fn point(language: &str) -> DimensionSpacePoint {
    DimensionSpacePoint::from_pairs([("language", language)])
}

pub(crate) fn create_root_workspace(cs: &str) -> ContentCommand {
    ContentCommand::CreateRootWorkspace(CreateRootWorkspace {
        workspace_name: WorkspaceName::live(),
        new_content_stream_id: stream(cs),
    })
}

pub(crate) fn create_workspace(name: &str, cs: &str) -> ContentCommand {
    ContentCommand::CreateWorkspace(CreateWorkspace {
        workspace_name: workspace(name),
        base_workspace_name: WorkspaceName::live(),
        new_content_stream_id: stream(cs),
    })
}

pub(crate) fn create_root_node(ws: &WorkspaceName, node: &str) -> ContentCommand {
    ContentCommand::CreateRootNodeAggregateWithNode(CreateRootNodeAggregateWithNode {
        workspace_name: ws.clone(),
        node_aggregate_id: id(node),
        node_type_name: NodeTypeName::new("Cms:Sites").unwrap(),
    })
}

pub(crate) fn create_node(
    ws: &WorkspaceName,
    node: &str,
    parent: &str,
    node_type: &str,
    name: &str,
    segment: &str,
) -> ContentCommand {
    ContentCommand::CreateNodeAggregateWithNode(CreateNodeAggregateWithNode {
        workspace_name: ws.clone(),
        node_aggregate_id: id(node),
        node_type_name: NodeTypeName::new(node_type).unwrap(),
        origin_dimension_space_point: OriginDimensionSpacePoint::new(point("de")),
        parent_node_aggregate_id: id(parent),
        succeeding_sibling_node_aggregate_id: None,
        node_name: Some(NodeName::new(name).unwrap()),
        initial_property_values: PropertyValues::new().with("uriPathSegment", segment),
    })
}

pub(crate) fn set_title(ws: &WorkspaceName, node: &str, title: &str) -> ContentCommand {
    ContentCommand::SetNodeProperties(SetNodeProperties {
        workspace_name: ws.clone(),
        node_aggregate_id: id(node),
        origin_dimension_space_point: OriginDimensionSpacePoint::new(point("de")),
        property_values: PropertyValues::new().with("title", title),
    })
}

pub(crate) fn remove_node(ws: &WorkspaceName, node: &str) -> ContentCommand {
    ContentCommand::RemoveNodeAggregate(RemoveNodeAggregate {
        workspace_name: ws.clone(),
        node_aggregate_id: id(node),
        covered_dimension_space_point: point("de"),
        node_variant_selection_strategy: Default::default(),
    })
}

/// Commands building `sites / site / {home / news, about}` in `ws`.
pub(crate) fn site_commands(ws: &WorkspaceName) -> Vec<ContentCommand> {
    vec![
        create_root_node(ws, "sites"),
        create_node(ws, "site", "sites", "Cms:Site", "acme", ""),
        create_node(ws, "home", "site", "Acme:Page", "home", "home"),
        create_node(ws, "about", "site", "Acme:Page", "about", "about"),
        create_node(ws, "news", "home", "Acme:Page", "news", "news"),
    ]
}
