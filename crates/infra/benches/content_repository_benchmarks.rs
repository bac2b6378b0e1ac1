use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use escr_content::commands::{
    CreateNodeAggregateWithNode, CreateRootNodeAggregateWithNode, CreateRootWorkspace, SetNodeProperties,
};
use escr_content::{ContentCommand, NodeFilter, PropertyValues, VisibilityConstraints};
use escr_core::{ContentStreamId, NodeAggregateId, NodeName, NodeTypeName, WorkspaceName};
use escr_dimension::{DimensionSpacePoint, OriginDimensionSpacePoint};
use escr_infra::subscription::ReplayOptions;
use escr_observability::LogConfig;
use escr_infra::{ContentRepository, ContentRepositoryBuilder, ContentRepositoryConfig};

const CONFIG: &str = r#"{
    "id": "bench",
    "dimensions": [
        { "id": "language", "values": [{ "value": "de", "specializations": [{ "value": "gsw" }] }] }
    ],
    "nodeTypes": {
        "Cms:Sites": { "root": true },
        "Cms:Document": { "abstract": true, "properties": { "title": {}, "uriPathSegment": {} } },
        "Cms:Site": { "superTypes": ["Cms:Document"] },
        "Acme:Page": { "superTypes": ["Cms:Document"] }
    }
}"#;

fn de() -> DimensionSpacePoint {
    DimensionSpacePoint::from_pairs([("language", "de")])
}

fn node(id: &str) -> NodeAggregateId {
    NodeAggregateId::new(id).unwrap()
}

fn create_page(id: &str, parent: &str) -> ContentCommand {
    ContentCommand::CreateNodeAggregateWithNode(CreateNodeAggregateWithNode {
        workspace_name: WorkspaceName::live(),
        node_aggregate_id: node(id),
        node_type_name: NodeTypeName::new("Acme:Page").unwrap(),
        origin_dimension_space_point: OriginDimensionSpacePoint::new(de()),
        parent_node_aggregate_id: node(parent),
        succeeding_sibling_node_aggregate_id: None,
        node_name: Some(NodeName::new(id).unwrap()),
        initial_property_values: PropertyValues::new().with("uriPathSegment", id),
    })
}

fn set_title(id: &str, title: &str) -> ContentCommand {
    ContentCommand::SetNodeProperties(SetNodeProperties {
        workspace_name: WorkspaceName::live(),
        node_aggregate_id: node(id),
        origin_dimension_space_point: OriginDimensionSpacePoint::new(de()),
        property_values: PropertyValues::new().with("title", title),
    })
}

/// A set-up repository with `sites / site` and `pages` pages below the site.
fn repository_with_pages(pages: usize) -> ContentRepository {
    let config = ContentRepositoryConfig::from_json_str(CONFIG).unwrap();
    let repository = ContentRepositoryBuilder::new(config).build().unwrap();
    repository.setup().unwrap();

    let live = WorkspaceName::live();
    repository
        .handle(&ContentCommand::CreateRootWorkspace(CreateRootWorkspace {
            workspace_name: live.clone(),
            new_content_stream_id: ContentStreamId::new("cs-live").unwrap(),
        }))
        .unwrap();
    repository
        .handle(&ContentCommand::CreateRootNodeAggregateWithNode(
            CreateRootNodeAggregateWithNode {
                workspace_name: live.clone(),
                node_aggregate_id: node("sites"),
                node_type_name: NodeTypeName::new("Cms:Sites").unwrap(),
            },
        ))
        .unwrap();
    repository
        .handle(&ContentCommand::CreateNodeAggregateWithNode(CreateNodeAggregateWithNode {
            workspace_name: live,
            node_aggregate_id: node("site"),
            node_type_name: NodeTypeName::new("Cms:Site").unwrap(),
            origin_dimension_space_point: OriginDimensionSpacePoint::new(de()),
            parent_node_aggregate_id: node("sites"),
            succeeding_sibling_node_aggregate_id: None,
            node_name: Some(NodeName::new("site").unwrap()),
            initial_property_values: PropertyValues::new(),
        }))
        .unwrap();
    for page in 0..pages {
        repository.handle(&create_page(&format!("page-{page}"), "site")).unwrap();
    }
    repository
}

fn bench_command_handling(c: &mut Criterion) {
    let _ = escr_observability::init_with(&LogConfig {
        filter: "error".to_string(),
        ..LogConfig::default()
    });
    let mut group = c.benchmark_group("command_handling");
    group.throughput(Throughput::Elements(1));

    group.bench_function("create_page_and_catch_up", |b| {
        b.iter_batched(
            || repository_with_pages(10),
            |repository| {
                repository.handle(black_box(&create_page("fresh", "site"))).unwrap();
                repository
            },
            BatchSize::SmallInput,
        );
    });

    // Same stream, growing history.
    let repository = repository_with_pages(100);
    let mut counter = 0_u64;
    group.bench_function("set_title_with_history", |b| {
        b.iter(|| {
            counter += 1;
            repository
                .handle(black_box(&set_title("page-50", &format!("Title {counter}"))))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_replay");
    group.sample_size(20);

    for pages in [100_usize, 1_000] {
        let repository = repository_with_pages(pages);
        let events = repository.highest_sequence_number().unwrap().value();
        group.throughput(Throughput::Elements(events));
        group.bench_with_input(BenchmarkId::from_parameter(pages), &repository, |b, repository| {
            b.iter(|| {
                let result = repository
                    .replay_all(&ReplayOptions::default(), |_| {}, |_| {})
                    .unwrap();
                black_box(result.processed())
            });
        });
    }

    group.finish();
}

fn bench_subgraph_queries(c: &mut Criterion) {
    let repository = repository_with_pages(1_000);
    let gsw = DimensionSpacePoint::from_pairs([("language", "gsw")]);

    c.bench_function("find_child_nodes_1000", |b| {
        b.iter(|| {
            repository.subgraph(&WorkspaceName::live(), &gsw, VisibilityConstraints::default(), |subgraph| {
                black_box(subgraph.find_child_nodes(&node("site"), &NodeFilter::new()).len())
            })
        });
    });
}

criterion_group!(benches, bench_command_handling, bench_replay, bench_subgraph_queries);
criterion_main!(benches);
