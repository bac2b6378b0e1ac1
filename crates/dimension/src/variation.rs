//! The inter-dimensional variation graph.
//!
//! Computed once from the dimension configuration and read-only afterwards.
//! A point `s` specializes a point `g` when, in every dimension, the value of
//! `s` equals the value of `g` or lies below it in the value tree, and the
//! two points differ.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use escr_core::ConfigurationError;

use crate::dimension::ContentDimensionSource;
use crate::point::{DimensionSpacePoint, DimensionSpacePointHash};
use crate::set::DimensionSpacePointSet;

/// How a target point relates to a source point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariantType {
    /// Both points are equal (no variation).
    Same,
    /// The target is more specific than the source.
    Specialization,
    /// The target is more general than the source.
    Generalization,
    /// Neither is a generalization of the other.
    Peer,
}

#[derive(Debug, Clone)]
struct PointNode {
    point: DimensionSpacePoint,
    /// Depth per dimension, in configuration order.
    weight: Vec<u32>,
    specializations: DimensionSpacePointSet,
    generalizations: DimensionSpacePointSet,
}

#[derive(Debug, Clone)]
pub struct InterDimensionalVariationGraph {
    source: ContentDimensionSource,
    allowed: DimensionSpacePointSet,
    nodes: HashMap<DimensionSpacePointHash, PointNode>,
}

impl InterDimensionalVariationGraph {
    pub fn new(source: ContentDimensionSource) -> Self {
        let allowed = source.allowed_points();
        let mut nodes: HashMap<DimensionSpacePointHash, PointNode> = allowed
            .iter()
            .map(|point| {
                let weight = source
                    .dimensions()
                    .iter()
                    .map(|d| {
                        point
                            .coordinate(d.id())
                            .and_then(|v| d.depth(v))
                            .unwrap_or_default()
                    })
                    .collect();
                (
                    point.hash().clone(),
                    PointNode {
                        point: point.clone(),
                        weight,
                        specializations: DimensionSpacePointSet::new(),
                        generalizations: DimensionSpacePointSet::new(),
                    },
                )
            })
            .collect();

        for general in allowed.iter() {
            for special in allowed.iter() {
                if general != special && Self::generalizes(&source, general, special) {
                    if let Some(node) = nodes.get_mut(general.hash()) {
                        node.specializations.insert(special.clone());
                    }
                    if let Some(node) = nodes.get_mut(special.hash()) {
                        node.generalizations.insert(general.clone());
                    }
                }
            }
        }

        Self {
            source,
            allowed,
            nodes,
        }
    }

    fn generalizes(
        source: &ContentDimensionSource,
        general: &DimensionSpacePoint,
        special: &DimensionSpacePoint,
    ) -> bool {
        source.dimensions().iter().all(|dimension| {
            match (general.coordinate(dimension.id()), special.coordinate(dimension.id())) {
                (Some(g), Some(s)) => dimension.is_same_or_generalization_of(g, s),
                _ => false,
            }
        })
    }

    pub fn dimension_source(&self) -> &ContentDimensionSource {
        &self.source
    }

    /// Every point the configuration allows.
    pub fn allowed_points(&self) -> &DimensionSpacePointSet {
        &self.allowed
    }

    pub fn contains(&self, point: &DimensionSpacePoint) -> bool {
        self.allowed.contains(point)
    }

    /// Fails with a configuration error for points outside the dimension space.
    pub fn node_exists(&self, point: &DimensionSpacePoint) -> Result<(), ConfigurationError> {
        self.node(point).map(|_| ())
    }

    fn node(&self, point: &DimensionSpacePoint) -> Result<&PointNode, ConfigurationError> {
        self.nodes
            .get(point.hash())
            .ok_or_else(|| ConfigurationError::UnknownDimensionSpacePoint(point.to_json()))
    }

    pub fn variant_type(
        &self,
        source: &DimensionSpacePoint,
        target: &DimensionSpacePoint,
    ) -> Result<VariantType, ConfigurationError> {
        let source_node = self.node(source)?;
        self.node(target)?;
        Ok(if source == target {
            VariantType::Same
        } else if source_node.specializations.contains(target) {
            VariantType::Specialization
        } else if source_node.generalizations.contains(target) {
            VariantType::Generalization
        } else {
            VariantType::Peer
        })
    }

    pub fn is_specialization(
        &self,
        special: &DimensionSpacePoint,
        general: &DimensionSpacePoint,
    ) -> Result<bool, ConfigurationError> {
        Ok(self.node(general)?.specializations.contains(special))
    }

    /// All specializations of `point`, optionally including `point` itself.
    pub fn specialization_set(
        &self,
        point: &DimensionSpacePoint,
        include_origin: bool,
    ) -> Result<DimensionSpacePointSet, ConfigurationError> {
        let mut set = self.node(point)?.specializations.clone();
        if include_origin {
            set.insert(point.clone());
        }
        Ok(set)
    }

    pub fn generalizations(
        &self,
        point: &DimensionSpacePoint,
    ) -> Result<DimensionSpacePointSet, ConfigurationError> {
        Ok(self.node(point)?.generalizations.clone())
    }

    /// The generalization content falls back to first.
    ///
    /// Among all generalizations, the one whose per-dimension depths are
    /// lexicographically greatest wins, so earlier dimensions stay as specific
    /// as possible while later ones are generalized first.
    pub fn primary_generalization(
        &self,
        point: &DimensionSpacePoint,
    ) -> Result<Option<DimensionSpacePoint>, ConfigurationError> {
        let node = self.node(point)?;
        Ok(node
            .generalizations
            .iter()
            .filter_map(|g| self.nodes.get(g.hash()))
            .max_by(|a, b| a.weight.cmp(&b.weight))
            .map(|n| n.point.clone()))
    }

    /// Points without any generalization.
    pub fn root_generalizations(&self) -> DimensionSpacePointSet {
        self.nodes
            .values()
            .filter(|n| n.generalizations.is_empty())
            .map(|n| n.point.clone())
            .collect()
    }

    /// Depth of the point's value per dimension, in configuration order.
    pub fn weight(&self, point: &DimensionSpacePoint) -> Result<&[u32], ConfigurationError> {
        Ok(&self.node(point)?.weight)
    }
}
