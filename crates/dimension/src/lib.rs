//! `escr-dimension` — the multi-axis content variation space.
//!
//! Dimension configuration is validated once into a [`ContentDimensionSource`];
//! the [`InterDimensionalVariationGraph`] derived from it answers every
//! specialization / generalization / peer question at runtime.

pub mod dimension;
pub mod point;
pub mod set;
pub mod strategy;
pub mod variation;

pub use dimension::{
    ContentDimension, ContentDimensionConfig, ContentDimensionSource, ContentDimensionValueConfig,
};
pub use point::{DimensionSpacePoint, DimensionSpacePointHash, OriginDimensionSpacePoint};
pub use set::{DimensionSpacePointSet, OriginDimensionSpacePointSet};
pub use strategy::{Coverage, NodeVariantSelectionStrategy};
pub use variation::{InterDimensionalVariationGraph, VariantType};
