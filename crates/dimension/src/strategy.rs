//! Variant selection strategies: which covered points a command affects.

use serde::{Deserialize, Serialize};

use escr_core::ConfigurationError;

use crate::point::{DimensionSpacePoint, OriginDimensionSpacePoint};
use crate::set::DimensionSpacePointSet;
use crate::variation::InterDimensionalVariationGraph;

/// What a strategy needs to know about a node aggregate.
pub trait Coverage {
    /// Every point the aggregate is visible in.
    fn covered_dimension_space_points(&self) -> &DimensionSpacePointSet;

    /// The origin of the variant visible at a covered point.
    fn occupying_origin(&self, covered: &DimensionSpacePoint) -> Option<&OriginDimensionSpacePoint>;
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeVariantSelectionStrategy {
    /// Every point the aggregate covers.
    AllVariants,
    /// The given point and all covered specializations of it.
    #[default]
    AllSpecializations,
    /// Only the given point.
    OnlyGivenVariant,
    /// The given point and those covered specializations that show the same variant.
    VirtualSpecializations,
}

impl NodeVariantSelectionStrategy {
    pub fn resolve_affected_points(
        &self,
        point: &DimensionSpacePoint,
        coverage: &impl Coverage,
        graph: &InterDimensionalVariationGraph,
    ) -> Result<DimensionSpacePointSet, ConfigurationError> {
        let covered = coverage.covered_dimension_space_points();
        Ok(match self {
            Self::AllVariants => covered.clone(),
            Self::AllSpecializations => graph
                .specialization_set(point, true)?
                .intersection(covered),
            Self::OnlyGivenVariant => {
                graph.node_exists(point)?;
                DimensionSpacePointSet::single(point.clone())
            }
            Self::VirtualSpecializations => {
                let origin = coverage.occupying_origin(point);
                graph
                    .specialization_set(point, true)?
                    .intersection(covered)
                    .into_iter()
                    .filter(|p| coverage.occupying_origin(p) == origin)
                    .collect()
            }
        })
    }
}
