//! Secondary projection: URI paths of document nodes in the live workspace.
//!
//! Only document nodes (types inheriting from `Cms:Document`) of root
//! workspace content streams are tracked. One row per node and covered point:
//!
//! ```text
//! partition: dimension space point hash
//!   key:     node aggregate id
//!   row:     sites/site/home/news   node aggregate id path (subtree lookups)
//!            home/news              uri path (site nodes have "")
//!            parent, preceding, succeeding document sibling
//!            disable level          how many `disabled` tags cover the node
//! ```
//!
//! Subtree operations (move, rename, tag, remove) select the node and every
//! row whose id path starts with the node's id path plus `/`.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use escr_content::events::*;
use escr_content::node_type::well_known;
use escr_content::{ContentEvent, NodeTypeManager, SubtreeTag};
use escr_core::{ContentStreamId, NodeAggregateId, NodeName, NodeTypeName};
use escr_dimension::{DimensionSpacePoint, DimensionSpacePointHash};
use escr_events::{EventEnvelope, Projection, ProjectionError};

use crate::read_model::{InMemoryPartitionedStore, PartitionedStore};

const URI_PATH_SEGMENT: &str = "uriPathSegment";
const TARGET_MODE: &str = "targetMode";
const TARGET: &str = "target";
const DEFAULT_TARGET_MODE: &str = "firstChildNode";

/// Where a shortcut node redirects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutTarget {
    pub mode: String,
    pub target: Option<String>,
}

impl Default for ShortcutTarget {
    fn default() -> Self {
        Self {
            mode: DEFAULT_TARGET_MODE.to_string(),
            target: None,
        }
    }
}

/// One document node as seen from one dimension space point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNodeInfo {
    pub node_aggregate_id: NodeAggregateId,
    pub dimension_space_point_hash: DimensionSpacePointHash,
    pub origin_dimension_space_point_hash: DimensionSpacePointHash,
    pub node_aggregate_id_path: String,
    pub uri_path: String,
    pub site_node_name: Option<NodeName>,
    pub parent_node_aggregate_id: Option<NodeAggregateId>,
    pub preceding_node_aggregate_id: Option<NodeAggregateId>,
    pub succeeding_node_aggregate_id: Option<NodeAggregateId>,
    pub node_type_name: NodeTypeName,
    pub shortcut_target: Option<ShortcutTarget>,
    pub disable_level: u32,
}

impl DocumentNodeInfo {
    pub fn is_root(&self) -> bool {
        self.parent_node_aggregate_id.is_none()
    }

    pub fn is_disabled(&self) -> bool {
        self.disable_level > 0
    }

    pub fn is_shortcut(&self) -> bool {
        self.shortcut_target.is_some()
    }

    /// Whether `other` is this node or lies below it.
    fn contains(&self, other: &DocumentNodeInfo) -> bool {
        other.node_aggregate_id == self.node_aggregate_id
            || other
                .node_aggregate_id_path
                .strip_prefix(self.node_aggregate_id_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

pub type DocumentUriPathStore = dyn PartitionedStore<DimensionSpacePointHash, NodeAggregateId, DocumentNodeInfo>;

pub struct DocumentUriPathProjection {
    store: Arc<DocumentUriPathStore>,
    node_types: Arc<NodeTypeManager>,
    live_content_streams: Arc<RwLock<BTreeSet<ContentStreamId>>>,
}

impl DocumentUriPathProjection {
    pub fn new(node_types: Arc<NodeTypeManager>) -> Self {
        let store: Arc<DocumentUriPathStore> = Arc::new(InMemoryPartitionedStore::<
            DimensionSpacePointHash,
            NodeAggregateId,
            DocumentNodeInfo,
        >::new());
        Self::with_store(node_types, store)
    }

    pub fn with_store(node_types: Arc<NodeTypeManager>, store: Arc<DocumentUriPathStore>) -> Self {
        Self {
            store,
            node_types,
            live_content_streams: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    pub fn finder(&self) -> DocumentUriPathFinder {
        DocumentUriPathFinder {
            store: self.store.clone(),
            live_content_streams: self.live_content_streams.clone(),
        }
    }

    fn is_live(&self, content_stream_id: &ContentStreamId) -> Result<bool, ProjectionError> {
        let live = self
            .live_content_streams
            .read()
            .map_err(|_| ProjectionError::apply("live content stream lock poisoned"))?;
        Ok(live.contains(content_stream_id))
    }

    fn is_document(&self, node_type_name: &NodeTypeName) -> bool {
        self.node_types.is_of_type(node_type_name, well_known::DOCUMENT)
    }

    fn is_shortcut(&self, node_type_name: &NodeTypeName) -> bool {
        self.node_types.is_of_type(node_type_name, well_known::SHORTCUT)
    }

    fn is_site(&self, node_type_name: &NodeTypeName) -> bool {
        self.node_types.is_of_type(node_type_name, well_known::SITE)
    }

    fn get(&self, id: &NodeAggregateId, hash: &DimensionSpacePointHash) -> Option<DocumentNodeInfo> {
        self.store.get(hash, id)
    }

    fn save(&self, row: DocumentNodeInfo) {
        self.store
            .upsert(row.dimension_space_point_hash.clone(), row.node_aggregate_id.clone(), row);
    }

    fn update(&self, id: &NodeAggregateId, hash: &DimensionSpacePointHash, f: impl FnOnce(&mut DocumentNodeInfo)) {
        if let Some(mut row) = self.get(id, hash) {
            f(&mut row);
            self.save(row);
        }
    }

    /// Apply `f` to `node` and every row below it in the node's point.
    fn update_subtree(&self, node: &DocumentNodeInfo, mut f: impl FnMut(&mut DocumentNodeInfo)) {
        for mut row in self.store.list(&node.dimension_space_point_hash) {
            if node.contains(&row) {
                f(&mut row);
                self.save(row);
            }
        }
    }

    fn children(&self, parent: &NodeAggregateId, hash: &DimensionSpacePointHash) -> impl Iterator<Item = DocumentNodeInfo> {
        let parent = parent.clone();
        self.store
            .list(hash)
            .into_iter()
            .filter(move |row| row.parent_node_aggregate_id.as_ref() == Some(&parent))
    }

    fn last_child(&self, parent: &NodeAggregateId, hash: &DimensionSpacePointHash) -> Option<DocumentNodeInfo> {
        self.children(parent, hash)
            .find(|row| row.succeeding_node_aggregate_id.is_none())
    }

    fn preceding(
        &self,
        succeeding: &NodeAggregateId,
        parent: &NodeAggregateId,
        hash: &DimensionSpacePointHash,
    ) -> Option<DocumentNodeInfo> {
        self.children(parent, hash)
            .find(|row| row.succeeding_node_aggregate_id.as_ref() == Some(succeeding))
    }

    /// Whether a `disabled` tag is set on `node` itself rather than inherited.
    fn is_explicitly_disabled(&self, node: &DocumentNodeInfo) -> bool {
        if !node.is_disabled() {
            return false;
        }
        let parent_level = node
            .parent_node_aggregate_id
            .as_ref()
            .and_then(|parent| self.get(parent, &node.dimension_space_point_hash))
            .map_or(0, |parent| parent.disable_level);
        node.disable_level != parent_level
    }

    fn disconnect_from_siblings(&self, node: &DocumentNodeInfo) {
        let hash = &node.dimension_space_point_hash;
        if let Some(preceding) = &node.preceding_node_aggregate_id {
            self.update(preceding, hash, |row| {
                row.succeeding_node_aggregate_id = node.succeeding_node_aggregate_id.clone();
            });
        }
        if let Some(succeeding) = &node.succeeding_node_aggregate_id {
            self.update(succeeding, hash, |row| {
                row.preceding_node_aggregate_id = node.preceding_node_aggregate_id.clone();
            });
        }
    }

    /// Link `node` in below `parent`, before `succeeding` or last.
    ///
    /// A succeeding sibling that is not tracked here (a content node) counts
    /// as no sibling.
    fn connect_with_siblings(
        &self,
        node: &mut DocumentNodeInfo,
        parent: &NodeAggregateId,
        succeeding: Option<&NodeAggregateId>,
    ) {
        let hash = node.dimension_space_point_hash.clone();
        let succeeding = succeeding.filter(|id| {
            self.get(id, &hash)
                .is_some_and(|row| row.parent_node_aggregate_id.as_ref() == Some(parent))
        });
        let preceding = match succeeding {
            Some(succeeding_id) => {
                let preceding = self.preceding(succeeding_id, parent, &hash);
                self.update(succeeding_id, &hash, |row| {
                    row.preceding_node_aggregate_id = Some(node.node_aggregate_id.clone());
                });
                preceding
            }
            None => self
                .last_child(parent, &hash)
                .filter(|row| row.node_aggregate_id != node.node_aggregate_id),
        };
        if let Some(preceding) = &preceding {
            self.update(&preceding.node_aggregate_id, &hash, |row| {
                row.succeeding_node_aggregate_id = Some(node.node_aggregate_id.clone());
            });
        }
        node.parent_node_aggregate_id = Some(parent.clone());
        node.preceding_node_aggregate_id = preceding.map(|row| row.node_aggregate_id);
        node.succeeding_node_aggregate_id = succeeding.cloned();
    }

    fn when_root_created(&self, e: &RootNodeAggregateWithNodeWasCreated) {
        for point in e.covered_dimension_space_points.iter() {
            self.save(root_row(&e.node_aggregate_id, point, e.node_type_name.clone()));
        }
    }

    fn when_root_dimensions_updated(&self, e: &RootNodeAggregateDimensionsWereUpdated) {
        let existing = self
            .store
            .partitions()
            .into_iter()
            .find_map(|hash| self.get(&e.node_aggregate_id, &hash));
        let Some(existing) = existing else {
            return;
        };
        for hash in self.store.partitions() {
            self.store.remove(&hash, &e.node_aggregate_id);
        }
        for point in e.covered_dimension_space_points.iter() {
            self.save(root_row(&e.node_aggregate_id, point, existing.node_type_name.clone()));
        }
    }

    fn when_node_created(&self, e: &NodeAggregateWithNodeWasCreated) {
        if !self.is_document(&e.node_type_name) {
            return;
        }
        let segment = e.initial_property_values.get_str(URI_PATH_SEGMENT).unwrap_or_default();
        let shortcut_target = self.is_shortcut(&e.node_type_name).then(|| ShortcutTarget {
            mode: e
                .initial_property_values
                .get_str(TARGET_MODE)
                .unwrap_or(DEFAULT_TARGET_MODE)
                .to_string(),
            target: e.initial_property_values.get_str(TARGET).map(str::to_string),
        });

        for sibling in e.succeeding_siblings_for_coverage.iter() {
            let hash = sibling.dimension_space_point.hash();
            let Some(parent) = self.get(&e.parent_node_aggregate_id, hash) else {
                debug!(parent = %e.parent_node_aggregate_id, "document parent missing, skipped");
                continue;
            };
            let (uri_path, site_node_name) = match (&e.node_name, parent.is_root()) {
                (Some(name), true) => (String::new(), Some(name.clone())),
                _ => (join_uri_path(&parent.uri_path, segment), parent.site_node_name.clone()),
            };
            let mut row = DocumentNodeInfo {
                node_aggregate_id: e.node_aggregate_id.clone(),
                dimension_space_point_hash: hash.clone(),
                origin_dimension_space_point_hash: e.origin_dimension_space_point.hash().clone(),
                node_aggregate_id_path: format!("{}/{}", parent.node_aggregate_id_path, e.node_aggregate_id),
                uri_path,
                site_node_name,
                parent_node_aggregate_id: None,
                preceding_node_aggregate_id: None,
                succeeding_node_aggregate_id: None,
                node_type_name: e.node_type_name.clone(),
                shortcut_target: shortcut_target.clone(),
                disable_level: parent.disable_level,
            };
            self.connect_with_siblings(&mut row, &parent.node_aggregate_id, sibling.node_aggregate_id.as_ref());
            self.save(row);
        }
    }

    fn when_type_changed(&self, e: &NodeAggregateTypeWasChanged) {
        let shortcut = self.is_shortcut(&e.new_node_type_name);
        if !shortcut && !self.is_document(&e.new_node_type_name) {
            return;
        }
        for hash in self.store.partitions() {
            self.update(&e.node_aggregate_id, &hash, |row| {
                row.node_type_name = e.new_node_type_name.clone();
                row.shortcut_target = if shortcut {
                    Some(row.shortcut_target.take().unwrap_or_default())
                } else {
                    None
                };
            });
        }
    }

    fn copy_variant(&self, variant: NodeVariantCreation<'_>) {
        let Some(source) = self.get(variant.node_aggregate_id, variant.source_origin.hash()) else {
            return;
        };
        for point in variant.siblings.points().iter() {
            // Variants may arrive out of order on import; replace what is there.
            self.store.remove(point.hash(), variant.node_aggregate_id);
            let mut row = source.clone();
            row.dimension_space_point_hash = point.hash().clone();
            row.origin_dimension_space_point_hash = variant.target_origin.hash().clone();
            self.save(row);
        }
    }

    fn when_tagged(&self, e: &SubtreeWasTagged) {
        if e.tag != SubtreeTag::disabled() {
            return;
        }
        for point in e.affected_dimension_space_points.iter() {
            let Some(node) = self.get(&e.node_aggregate_id, point.hash()) else {
                continue;
            };
            if self.is_explicitly_disabled(&node) {
                continue;
            }
            self.update_subtree(&node, |row| row.disable_level += 1);
        }
    }

    fn when_untagged(&self, e: &SubtreeWasUntagged) {
        if e.tag != SubtreeTag::disabled() {
            return;
        }
        for point in e.affected_dimension_space_points.iter() {
            let Some(node) = self.get(&e.node_aggregate_id, point.hash()) else {
                continue;
            };
            if !self.is_explicitly_disabled(&node) {
                continue;
            }
            self.update_subtree(&node, |row| row.disable_level = row.disable_level.saturating_sub(1));
        }
    }

    fn when_removed(&self, e: &NodeAggregateWasRemoved) {
        for point in e.affected_covered_dimension_space_points.iter() {
            let Some(node) = self.get(&e.node_aggregate_id, point.hash()) else {
                continue;
            };
            self.disconnect_from_siblings(&node);
            for row in self.store.list(point.hash()) {
                if node.contains(&row) {
                    self.store.remove(point.hash(), &row.node_aggregate_id);
                }
            }
        }
    }

    fn when_properties_set(&self, e: &NodePropertiesWereSet) {
        let values = &e.property_values;
        let segment = values.get_str(URI_PATH_SEGMENT);
        let target_mode = values.get_str(TARGET_MODE);
        let target = values.get_str(TARGET);
        if segment.is_none() && target_mode.is_none() && target.is_none() {
            return;
        }

        for point in e.affected_dimension_space_points.iter() {
            let Some(node) = self.get(&e.node_aggregate_id, point.hash()) else {
                continue;
            };
            if self.is_site(&node.node_type_name) {
                continue;
            }
            if (target_mode.is_some() || target.is_some()) && node.is_shortcut() {
                self.update(&node.node_aggregate_id, point.hash(), |row| {
                    if let Some(shortcut) = row.shortcut_target.as_mut() {
                        if let Some(mode) = target_mode {
                            shortcut.mode = mode.to_string();
                        }
                        if let Some(target) = target {
                            shortcut.target = Some(target.to_string());
                        }
                    }
                });
            }

            let Some(segment) = segment else {
                continue;
            };
            let old_uri_path = node.uri_path.clone();
            let new_uri_path = match old_uri_path.rsplit_once('/') {
                Some((prefix, _)) => format!("{prefix}/{segment}"),
                None => segment.to_string(),
            };
            self.update_subtree(&node, |row| {
                let suffix = row.uri_path.get(old_uri_path.len()..).unwrap_or_default();
                row.uri_path = format!("{new_uri_path}{suffix}");
            });
        }
    }

    fn when_moved(&self, e: &NodeAggregateWasMoved) {
        for sibling in e.succeeding_siblings_for_coverage.iter() {
            let hash = sibling.dimension_space_point.hash();
            let Some(node) = self.get(&e.node_aggregate_id, hash) else {
                continue;
            };
            let Some(new_parent_id) = e
                .new_parent_node_aggregate_id
                .clone()
                .or_else(|| node.parent_node_aggregate_id.clone())
            else {
                continue;
            };
            self.move_node(node, &new_parent_id, sibling.node_aggregate_id.as_ref());
        }
    }

    fn move_node(
        &self,
        node: DocumentNodeInfo,
        new_parent_id: &NodeAggregateId,
        new_succeeding: Option<&NodeAggregateId>,
    ) {
        let hash = node.dimension_space_point_hash.clone();
        let explicitly_disabled = self.is_explicitly_disabled(&node);

        self.disconnect_from_siblings(&node);
        let mut moved = node.clone();
        moved.preceding_node_aggregate_id = None;
        moved.succeeding_node_aggregate_id = None;
        self.save(moved.clone());
        self.connect_with_siblings(&mut moved, new_parent_id, new_succeeding);
        self.save(moved);

        if node.parent_node_aggregate_id.as_ref() == Some(new_parent_id) {
            return;
        }
        let Some(new_parent) = self.get(new_parent_id, &hash) else {
            // The new parent does not exist in this point.
            return;
        };

        let target_level = new_parent.disable_level + u32::from(explicitly_disabled);
        let delta = i64::from(target_level) - i64::from(node.disable_level);
        let id_path_offset = node.node_aggregate_id_path.rfind('/').map_or(0, |i| i + 1);
        let uri_path_offset = if new_parent.is_root() {
            node.uri_path.len() + 1
        } else {
            node.uri_path.rfind('/').map_or(0, |i| i + 1)
        };

        self.update_subtree(&node, |row| {
            let id_suffix = row.node_aggregate_id_path.get(id_path_offset..).unwrap_or_default();
            row.node_aggregate_id_path = format!("{}/{}", new_parent.node_aggregate_id_path, id_suffix)
                .trim_end_matches('/')
                .to_string();
            let uri_suffix = row.uri_path.get(uri_path_offset..).unwrap_or_default();
            row.uri_path = join_uri_path(&new_parent.uri_path, uri_suffix);
            if !new_parent.is_root() {
                row.site_node_name = new_parent.site_node_name.clone();
            }
            row.disable_level = u32::try_from(i64::from(row.disable_level) + delta).unwrap_or(0);
        });
    }

    fn when_dimension_space_point_moved(&self, e: &DimensionSpacePointWasMoved) {
        let (source, target) = (e.source.hash(), e.target.hash());
        for mut row in self.store.list(source) {
            self.store.remove(source, &row.node_aggregate_id);
            row.dimension_space_point_hash = target.clone();
            self.save(row);
        }
        for hash in self.store.partitions() {
            for mut row in self.store.list(&hash) {
                if &row.origin_dimension_space_point_hash == source {
                    row.origin_dimension_space_point_hash = target.clone();
                    self.save(row);
                }
            }
        }
    }

    fn when_shine_through_added(&self, e: &DimensionShineThroughWasAdded) {
        for mut row in self.store.list(e.source.hash()) {
            row.dimension_space_point_hash = e.target.hash().clone();
            self.save(row);
        }
    }
}

impl Projection for DocumentUriPathProjection {
    type Ev = ContentEvent;

    fn reset(&mut self) -> Result<(), ProjectionError> {
        self.store.clear();
        self.live_content_streams
            .write()
            .map_err(|_| ProjectionError::apply("live content stream lock poisoned"))?
            .clear();
        Ok(())
    }

    fn apply(&mut self, envelope: &EventEnvelope<ContentEvent>) -> Result<(), ProjectionError> {
        let event = envelope.payload();
        if let ContentEvent::RootWorkspaceWasCreated(e) = event {
            self.live_content_streams
                .write()
                .map_err(|_| ProjectionError::apply("live content stream lock poisoned"))?
                .insert(e.new_content_stream_id.clone());
            return Ok(());
        }
        match event.content_stream_id() {
            Some(id) if !event.is_content_stream_lifecycle() && self.is_live(id)? => {}
            _ => return Ok(()),
        }

        match event {
            ContentEvent::RootNodeAggregateWithNodeWasCreated(e) => self.when_root_created(e),
            ContentEvent::RootNodeAggregateDimensionsWereUpdated(e) => self.when_root_dimensions_updated(e),
            ContentEvent::NodeAggregateWithNodeWasCreated(e) => self.when_node_created(e),
            ContentEvent::NodeAggregateTypeWasChanged(e) => self.when_type_changed(e),
            ContentEvent::NodeSpecializationVariantWasCreated(_)
            | ContentEvent::NodeGeneralizationVariantWasCreated(_)
            | ContentEvent::NodePeerVariantWasCreated(_) => {
                if let Some(variant) = event.as_node_variant_creation() {
                    self.copy_variant(variant);
                }
            }
            ContentEvent::SubtreeWasTagged(e) => self.when_tagged(e),
            ContentEvent::SubtreeWasUntagged(e) => self.when_untagged(e),
            ContentEvent::NodeAggregateWasRemoved(e) => self.when_removed(e),
            ContentEvent::NodePropertiesWereSet(e) => self.when_properties_set(e),
            ContentEvent::NodeAggregateWasMoved(e) => self.when_moved(e),
            ContentEvent::DimensionSpacePointWasMoved(e) => self.when_dimension_space_point_moved(e),
            ContentEvent::DimensionShineThroughWasAdded(e) => self.when_shine_through_added(e),
            ContentEvent::NodeAggregateNameWasChanged(_)
            | ContentEvent::RootWorkspaceWasCreated(_)
            | ContentEvent::WorkspaceWasCreated(_)
            | ContentEvent::WorkspaceWasPublished(_)
            | ContentEvent::WorkspaceWasRebased(_)
            | ContentEvent::WorkspaceWasDiscarded(_)
            | ContentEvent::ContentStreamWasCreated(_)
            | ContentEvent::ContentStreamWasForked(_)
            | ContentEvent::ContentStreamWasRemoved(_) => {}
        }
        Ok(())
    }
}

fn root_row(id: &NodeAggregateId, point: &DimensionSpacePoint, node_type_name: NodeTypeName) -> DocumentNodeInfo {
    DocumentNodeInfo {
        node_aggregate_id: id.clone(),
        dimension_space_point_hash: point.hash().clone(),
        origin_dimension_space_point_hash: DimensionSpacePoint::empty().hash().clone(),
        node_aggregate_id_path: id.to_string(),
        uri_path: String::new(),
        site_node_name: None,
        parent_node_aggregate_id: None,
        preceding_node_aggregate_id: None,
        succeeding_node_aggregate_id: None,
        node_type_name,
        shortcut_target: None,
        disable_level: 0,
    }
}

fn join_uri_path(parent: &str, segment: &str) -> String {
    let segment = segment.trim_start_matches('/');
    if parent.is_empty() {
        segment.to_string()
    } else if segment.is_empty() {
        parent.to_string()
    } else {
        format!("{parent}/{segment}")
    }
}

/// Queries over the projected URI paths.
#[derive(Clone)]
pub struct DocumentUriPathFinder {
    store: Arc<DocumentUriPathStore>,
    live_content_streams: Arc<RwLock<BTreeSet<ContentStreamId>>>,
}

impl DocumentUriPathFinder {
    pub fn is_live_content_stream(&self, content_stream_id: &ContentStreamId) -> bool {
        self.live_content_streams
            .read()
            .map(|live| live.contains(content_stream_id))
            .unwrap_or(false)
    }

    pub fn get_by_id_and_dimension_space_point_hash(
        &self,
        id: &NodeAggregateId,
        hash: &DimensionSpacePointHash,
    ) -> Option<DocumentNodeInfo> {
        self.store.get(hash, id)
    }

    /// The enabled document behind `uri_path` in one site.
    pub fn get_enabled_by_site_and_uri_path(
        &self,
        site_node_name: &NodeName,
        uri_path: &str,
        hash: &DimensionSpacePointHash,
    ) -> Option<DocumentNodeInfo> {
        let uri_path = uri_path.trim_matches('/');
        self.store.list(hash).into_iter().find(|row| {
            !row.is_disabled()
                && row.site_node_name.as_ref() == Some(site_node_name)
                && row.uri_path == uri_path
        })
    }

    /// Children of `parent` in sibling order.
    pub fn get_children(&self, parent: &NodeAggregateId, hash: &DimensionSpacePointHash) -> Vec<DocumentNodeInfo> {
        let children: Vec<DocumentNodeInfo> = self
            .store
            .list(hash)
            .into_iter()
            .filter(|row| row.parent_node_aggregate_id.as_ref() == Some(parent))
            .collect();
        let mut ordered = Vec::with_capacity(children.len());
        let mut next = children.iter().find(|row| row.preceding_node_aggregate_id.is_none());
        while let Some(row) = next {
            if ordered.len() == children.len() {
                break;
            }
            ordered.push(row.clone());
            next = row
                .succeeding_node_aggregate_id
                .as_ref()
                .and_then(|id| children.iter().find(|c| &c.node_aggregate_id == id));
        }
        ordered
    }

    pub fn get_first_enabled_child_node(
        &self,
        parent: &NodeAggregateId,
        hash: &DimensionSpacePointHash,
    ) -> Option<DocumentNodeInfo> {
        self.get_children(parent, hash).into_iter().find(|row| !row.is_disabled())
    }

    pub fn get_parent_node(&self, node: &DocumentNodeInfo) -> Option<DocumentNodeInfo> {
        node.parent_node_aggregate_id
            .as_ref()
            .and_then(|parent| self.store.get(&node.dimension_space_point_hash, parent))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use escr_content::NodeTypeConfig;
    use escr_content::node::NodeAggregateClassification;
    use escr_content::property::PropertyValues;
    use escr_core::{EventId, WorkspaceName};
    use escr_dimension::{DimensionSpacePointSet, OriginDimensionSpacePoint, OriginDimensionSpacePointSet};
    use escr_events::{Event, SequenceNumber, StreamName};

    use super::*;

    fn node_types() -> Arc<NodeTypeManager> {
        let configs: BTreeMap<String, NodeTypeConfig> = serde_json::from_value(serde_json::json!({
            "Cms:Sites": { "root": true },
            "Cms:Document": { "abstract": true },
            "Cms:Site": { "superTypes": ["Cms:Document"] },
            "Cms:Shortcut": { "superTypes": ["Cms:Document"] },
            "Acme:Page": { "superTypes": ["Cms:Document"] },
            "Acme:Text": {}
        }))
        .unwrap();
        Arc::new(NodeTypeManager::from_config(&configs).unwrap())
    }

    fn id(value: &str) -> NodeAggregateId {
        NodeAggregateId::new(value).unwrap()
    }

    fn point() -> DimensionSpacePoint {
        DimensionSpacePoint::from_pairs([("language", "de")])
    }

    struct Harness {
        projection: DocumentUriPathProjection,
        finder: DocumentUriPathFinder,
        stream: ContentStreamId,
        sequence: u64,
    }

    impl Harness {
        /// `sites / site / {home / news, about}` in the live workspace.
        fn new() -> Self {
            let projection = DocumentUriPathProjection::new(node_types());
            let finder = projection.finder();
            let mut harness = Self {
                projection,
                finder,
                stream: ContentStreamId::new("cs-live").unwrap(),
                sequence: 0,
            };
            harness.apply(ContentEvent::RootWorkspaceWasCreated(RootWorkspaceWasCreated {
                workspace_name: WorkspaceName::live(),
                new_content_stream_id: harness.stream.clone(),
            }));
            harness.apply(ContentEvent::RootNodeAggregateWithNodeWasCreated(
                RootNodeAggregateWithNodeWasCreated {
                    workspace_name: WorkspaceName::live(),
                    content_stream_id: harness.stream.clone(),
                    node_aggregate_id: id("sites"),
                    node_type_name: NodeTypeName::new("Cms:Sites").unwrap(),
                    covered_dimension_space_points: DimensionSpacePointSet::single(point()),
                    node_aggregate_classification: NodeAggregateClassification::Root,
                },
            ));
            harness.create("site", "sites", "Cms:Site", Some("acme"), "", None);
            harness.create("home", "site", "Acme:Page", Some("home"), "home", None);
            harness.create("about", "site", "Acme:Page", Some("about"), "about", None);
            harness.create("news", "home", "Acme:Page", Some("news"), "news", None);
            harness
        }

        fn apply(&mut self, event: ContentEvent) {
            self.sequence += 1;
            let envelope = EventEnvelope::new(EventId::new(), event.event_type(), event)
                .in_stream(StreamName::new("test"), self.sequence)
                .at_sequence(SequenceNumber::new(self.sequence));
            self.projection.apply(&envelope).unwrap();
        }

        fn create(
            &mut self,
            node: &str,
            parent: &str,
            node_type: &str,
            name: Option<&str>,
            segment: &str,
            before: Option<&str>,
        ) {
            self.apply(ContentEvent::NodeAggregateWithNodeWasCreated(NodeAggregateWithNodeWasCreated {
                workspace_name: WorkspaceName::live(),
                content_stream_id: self.stream.clone(),
                node_aggregate_id: id(node),
                node_type_name: NodeTypeName::new(node_type).unwrap(),
                origin_dimension_space_point: OriginDimensionSpacePoint::new(point()),
                succeeding_siblings_for_coverage: InterdimensionalSiblings::new(vec![InterdimensionalSibling {
                    dimension_space_point: point(),
                    node_aggregate_id: before.map(id),
                }]),
                parent_node_aggregate_id: id(parent),
                node_name: name.map(|n| NodeName::new(n).unwrap()),
                initial_property_values: PropertyValues::new().with(URI_PATH_SEGMENT, segment),
                node_aggregate_classification: NodeAggregateClassification::Regular,
            }));
        }

        fn tag(&mut self, node: &str, tagged: bool) {
            let points = DimensionSpacePointSet::single(point());
            let event = if tagged {
                ContentEvent::SubtreeWasTagged(SubtreeWasTagged {
                    workspace_name: WorkspaceName::live(),
                    content_stream_id: self.stream.clone(),
                    node_aggregate_id: id(node),
                    affected_dimension_space_points: points,
                    tag: SubtreeTag::disabled(),
                })
            } else {
                ContentEvent::SubtreeWasUntagged(SubtreeWasUntagged {
                    workspace_name: WorkspaceName::live(),
                    content_stream_id: self.stream.clone(),
                    node_aggregate_id: id(node),
                    affected_dimension_space_points: points,
                    tag: SubtreeTag::disabled(),
                })
            };
            self.apply(event);
        }

        fn row(&self, node: &str) -> Option<DocumentNodeInfo> {
            self.finder
                .get_by_id_and_dimension_space_point_hash(&id(node), point().hash())
        }

        fn uri(&self, node: &str) -> String {
            self.row(node).unwrap().uri_path
        }

        fn children(&self, parent: &str) -> Vec<String> {
            self.finder
                .get_children(&id(parent), point().hash())
                .into_iter()
                .map(|row| row.node_aggregate_id.to_string())
                .collect()
        }
    }

    #[test]
    fn documents_get_uri_paths_below_their_site() {
        let mut harness = Harness::new();
        assert_eq!(harness.uri("site"), "");
        assert_eq!(harness.uri("home"), "home");
        assert_eq!(harness.uri("news"), "home/news");
        assert_eq!(harness.row("news").unwrap().node_aggregate_id_path, "sites/site/home/news");

        let site = NodeName::new("acme").unwrap();
        let found = harness
            .finder
            .get_enabled_by_site_and_uri_path(&site, "/home/news", point().hash())
            .unwrap();
        assert_eq!(found.node_aggregate_id, id("news"));

        // Content nodes are not tracked.
        harness.create("text", "home", "Acme:Text", None, "", None);
        assert!(harness.row("text").is_none());
    }

    #[test]
    fn siblings_stay_linked_in_order() {
        let mut harness = Harness::new();
        harness.create("contact", "site", "Acme:Page", None, "contact", Some("about"));
        assert_eq!(harness.children("site"), vec!["home", "contact", "about"]);

        let contact = harness.row("contact").unwrap();
        assert_eq!(contact.preceding_node_aggregate_id, Some(id("home")));
        assert_eq!(contact.succeeding_node_aggregate_id, Some(id("about")));
    }

    #[test]
    fn renaming_a_segment_rewrites_the_subtree() {
        let mut harness = Harness::new();
        harness.apply(ContentEvent::NodePropertiesWereSet(NodePropertiesWereSet {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            node_aggregate_id: id("home"),
            origin_dimension_space_point: OriginDimensionSpacePoint::new(point()),
            affected_dimension_space_points: DimensionSpacePointSet::single(point()),
            property_values: PropertyValues::new().with(URI_PATH_SEGMENT, "start"),
            properties_to_unset: Vec::new(),
        }));
        assert_eq!(harness.uri("home"), "start");
        assert_eq!(harness.uri("news"), "start/news");
        assert_eq!(harness.uri("about"), "about");
    }

    #[test]
    fn moving_rewrites_paths_and_relinks_siblings() {
        let mut harness = Harness::new();
        harness.apply(ContentEvent::NodeAggregateWasMoved(NodeAggregateWasMoved {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            node_aggregate_id: id("home"),
            new_parent_node_aggregate_id: Some(id("about")),
            succeeding_siblings_for_coverage: InterdimensionalSiblings::new(vec![InterdimensionalSibling {
                dimension_space_point: point(),
                node_aggregate_id: None,
            }]),
        }));

        assert_eq!(harness.uri("home"), "about/home");
        assert_eq!(harness.uri("news"), "about/home/news");
        assert_eq!(harness.row("news").unwrap().node_aggregate_id_path, "sites/site/about/home/news");
        assert_eq!(harness.children("site"), vec!["about"]);
        assert_eq!(harness.children("about"), vec!["home"]);
        assert_eq!(harness.row("about").unwrap().preceding_node_aggregate_id, None);
    }

    #[test]
    fn tagging_then_untagging_restores_disable_levels() {
        let mut harness = Harness::new();
        harness.tag("home", true);
        assert_eq!(harness.row("home").unwrap().disable_level, 1);
        assert_eq!(harness.row("news").unwrap().disable_level, 1);

        // Inherited only, so untagging the child changes nothing.
        harness.tag("news", false);
        assert_eq!(harness.row("news").unwrap().disable_level, 1);

        harness.tag("home", false);
        assert_eq!(harness.row("home").unwrap().disable_level, 0);
        assert_eq!(harness.row("news").unwrap().disable_level, 0);
    }

    #[test]
    fn moving_out_of_a_disabled_subtree_drops_the_inherited_level() {
        let mut harness = Harness::new();
        harness.tag("home", true);
        harness.apply(ContentEvent::NodeAggregateWasMoved(NodeAggregateWasMoved {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            node_aggregate_id: id("news"),
            new_parent_node_aggregate_id: Some(id("about")),
            succeeding_siblings_for_coverage: InterdimensionalSiblings::new(vec![InterdimensionalSibling {
                dimension_space_point: point(),
                node_aggregate_id: None,
            }]),
        }));
        assert_eq!(harness.row("news").unwrap().disable_level, 0);
        assert_eq!(harness.uri("news"), "about/news");
    }

    #[test]
    fn removal_drops_the_subtree_and_closes_the_gap() {
        let mut harness = Harness::new();
        harness.create("contact", "site", "Acme:Page", None, "contact", None);
        let mut occupied = OriginDimensionSpacePointSet::new();
        occupied.insert(OriginDimensionSpacePoint::new(point()));
        harness.apply(ContentEvent::NodeAggregateWasRemoved(NodeAggregateWasRemoved {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            node_aggregate_id: id("about"),
            affected_occupied_dimension_space_points: occupied,
            affected_covered_dimension_space_points: DimensionSpacePointSet::single(point()),
        }));
        assert!(harness.row("about").is_none());
        assert_eq!(harness.children("site"), vec!["home", "contact"]);
        assert_eq!(harness.row("home").unwrap().succeeding_node_aggregate_id, Some(id("contact")));
    }

    #[test]
    fn shortcuts_track_their_target() {
        let mut harness = Harness::new();
        harness.create("go", "site", "Cms:Shortcut", None, "go", None);
        assert_eq!(harness.row("go").unwrap().shortcut_target, Some(ShortcutTarget::default()));

        harness.apply(ContentEvent::NodePropertiesWereSet(NodePropertiesWereSet {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            node_aggregate_id: id("go"),
            origin_dimension_space_point: OriginDimensionSpacePoint::new(point()),
            affected_dimension_space_points: DimensionSpacePointSet::single(point()),
            property_values: PropertyValues::new()
                .with(TARGET_MODE, "selectedTarget")
                .with(TARGET, "node://about"),
            properties_to_unset: Vec::new(),
        }));
        let target = harness.row("go").unwrap().shortcut_target.unwrap();
        assert_eq!(target.mode, "selectedTarget");
        assert_eq!(target.target.as_deref(), Some("node://about"));

        harness.apply(ContentEvent::NodeAggregateTypeWasChanged(NodeAggregateTypeWasChanged {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            node_aggregate_id: id("go"),
            new_node_type_name: NodeTypeName::new("Acme:Page").unwrap(),
        }));
        assert_eq!(harness.row("go").unwrap().shortcut_target, None);
    }

    #[test]
    fn dimension_moves_rekey_and_shine_through_copies() {
        let mut harness = Harness::new();
        let target = DimensionSpacePoint::from_pairs([("language", "de_CH")]);
        harness.apply(ContentEvent::DimensionShineThroughWasAdded(DimensionShineThroughWasAdded {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            source: point(),
            target: target.clone(),
        }));
        let copied = harness
            .finder
            .get_by_id_and_dimension_space_point_hash(&id("news"), target.hash())
            .unwrap();
        assert_eq!(copied.uri_path, "home/news");
        assert!(harness.row("news").is_some());

        let moved_to = DimensionSpacePoint::from_pairs([("language", "fr")]);
        harness.apply(ContentEvent::DimensionSpacePointWasMoved(DimensionSpacePointWasMoved {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            source: point(),
            target: moved_to.clone(),
        }));
        assert!(harness.row("news").is_none());
        let moved = harness
            .finder
            .get_by_id_and_dimension_space_point_hash(&id("news"), moved_to.hash())
            .unwrap();
        assert_eq!(&moved.origin_dimension_space_point_hash, moved_to.hash());
    }

    #[test]
    fn variants_into_a_covered_point_replace_the_copied_row() {
        let mut harness = Harness::new();
        let swiss = DimensionSpacePoint::from_pairs([("language", "de_CH")]);
        harness.apply(ContentEvent::DimensionShineThroughWasAdded(DimensionShineThroughWasAdded {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            source: point(),
            target: swiss.clone(),
        }));
        let variant = ContentEvent::NodeSpecializationVariantWasCreated(NodeSpecializationVariantWasCreated {
            workspace_name: WorkspaceName::live(),
            content_stream_id: harness.stream.clone(),
            node_aggregate_id: id("home"),
            source_origin: OriginDimensionSpacePoint::new(point()),
            specialization_origin: OriginDimensionSpacePoint::new(swiss.clone()),
            specialization_siblings: InterdimensionalSiblings::new(vec![InterdimensionalSibling {
                dimension_space_point: swiss.clone(),
                node_aggregate_id: Some(id("about")),
            }]),
        });
        harness.apply(variant.clone());
        harness.apply(variant);

        let home = harness
            .finder
            .get_by_id_and_dimension_space_point_hash(&id("home"), swiss.hash())
            .unwrap();
        assert_eq!(&home.origin_dimension_space_point_hash, swiss.hash());
        assert_eq!(home.uri_path, "home");
        assert_eq!(home.succeeding_node_aggregate_id, Some(id("about")));
        let children: Vec<_> = harness
            .finder
            .get_children(&id("site"), swiss.hash())
            .into_iter()
            .map(|row| row.node_aggregate_id.to_string())
            .collect();
        assert_eq!(children, vec!["home", "about"]);
        assert!(harness
            .finder
            .get_by_id_and_dimension_space_point_hash(&id("news"), swiss.hash())
            .is_some());
        assert_eq!(&harness.row("home").unwrap().origin_dimension_space_point_hash, point().hash());
    }

    #[test]
    fn non_live_content_streams_are_ignored() {
        let mut harness = Harness::new();
        harness.stream = ContentStreamId::new("cs-user").unwrap();
        harness.create("draft", "site", "Acme:Page", None, "draft", None);
        assert!(harness.row("draft").is_none());
        assert!(!harness.finder.is_live_content_stream(&harness.stream));
    }
}
