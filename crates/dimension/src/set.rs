//! Ordered sets of dimension space points.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::point::{DimensionSpacePoint, DimensionSpacePointHash, OriginDimensionSpacePoint};

/// A set of dimension space points keyed by hash.
///
/// Iteration order is the hash order, so it is stable across processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DimensionSpacePoint>", into = "Vec<DimensionSpacePoint>")]
pub struct DimensionSpacePointSet {
    points: BTreeMap<DimensionSpacePointHash, DimensionSpacePoint>,
}

impl DimensionSpacePointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(point: DimensionSpacePoint) -> Self {
        [point].into_iter().collect()
    }

    pub fn insert(&mut self, point: DimensionSpacePoint) -> bool {
        self.points.insert(point.hash().clone(), point).is_none()
    }

    pub fn remove(&mut self, point: &DimensionSpacePoint) -> bool {
        self.points.remove(point.hash()).is_some()
    }

    pub fn contains(&self, point: &DimensionSpacePoint) -> bool {
        self.points.contains_key(point.hash())
    }

    pub fn contains_hash(&self, hash: &DimensionSpacePointHash) -> bool {
        self.points.contains_key(hash)
    }

    pub fn get(&self, hash: &DimensionSpacePointHash) -> Option<&DimensionSpacePoint> {
        self.points.get(hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DimensionSpacePoint> {
        self.points.values()
    }

    pub fn hashes(&self) -> impl Iterator<Item = &DimensionSpacePointHash> {
        self.points.keys()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn union(&self, other: &Self) -> Self {
        self.iter().chain(other.iter()).cloned().collect()
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.iter().filter(|p| other.contains(p)).cloned().collect()
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.iter().filter(|p| !other.contains(p)).cloned().collect()
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.hashes().all(|h| other.contains_hash(h))
    }
}

impl FromIterator<DimensionSpacePoint> for DimensionSpacePointSet {
    fn from_iter<T: IntoIterator<Item = DimensionSpacePoint>>(iter: T) -> Self {
        let mut set = Self::new();
        for point in iter {
            set.insert(point);
        }
        set
    }
}

impl IntoIterator for DimensionSpacePointSet {
    type Item = DimensionSpacePoint;
    type IntoIter = std::collections::btree_map::IntoValues<DimensionSpacePointHash, DimensionSpacePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_values()
    }
}

impl<'a> IntoIterator for &'a DimensionSpacePointSet {
    type Item = &'a DimensionSpacePoint;
    type IntoIter = std::collections::btree_map::Values<'a, DimensionSpacePointHash, DimensionSpacePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.values()
    }
}

impl From<Vec<DimensionSpacePoint>> for DimensionSpacePointSet {
    fn from(value: Vec<DimensionSpacePoint>) -> Self {
        value.into_iter().collect()
    }
}

impl From<DimensionSpacePointSet> for Vec<DimensionSpacePoint> {
    fn from(value: DimensionSpacePointSet) -> Self {
        value.points.into_values().collect()
    }
}

/// A set of origin points (the points a node aggregate "occupies").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "Vec<OriginDimensionSpacePoint>",
    into = "Vec<OriginDimensionSpacePoint>"
)]
pub struct OriginDimensionSpacePointSet {
    points: BTreeMap<DimensionSpacePointHash, OriginDimensionSpacePoint>,
}

impl OriginDimensionSpacePointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, point: OriginDimensionSpacePoint) -> bool {
        self.points.insert(point.hash().clone(), point).is_none()
    }

    pub fn remove(&mut self, point: &OriginDimensionSpacePoint) -> bool {
        self.points.remove(point.hash()).is_some()
    }

    pub fn contains(&self, point: &OriginDimensionSpacePoint) -> bool {
        self.points.contains_key(point.hash())
    }

    pub fn iter(&self) -> impl Iterator<Item = &OriginDimensionSpacePoint> {
        self.points.values()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_dimension_space_point_set(&self) -> DimensionSpacePointSet {
        self.iter().map(|o| o.to_dimension_space_point()).collect()
    }
}

impl FromIterator<OriginDimensionSpacePoint> for OriginDimensionSpacePointSet {
    fn from_iter<T: IntoIterator<Item = OriginDimensionSpacePoint>>(iter: T) -> Self {
        let mut set = Self::new();
        for point in iter {
            set.insert(point);
        }
        set
    }
}

impl From<Vec<OriginDimensionSpacePoint>> for OriginDimensionSpacePointSet {
    fn from(value: Vec<OriginDimensionSpacePoint>) -> Self {
        value.into_iter().collect()
    }
}

impl From<OriginDimensionSpacePointSet> for Vec<OriginDimensionSpacePoint> {
    fn from(value: OriginDimensionSpacePointSet) -> Self {
        value.points.into_values().collect()
    }
}
