//! Dimension space points and their stable hashes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Stable lookup key derived from a point's coordinates.
///
/// Two points with the same coordinates always produce the same hash, in any
/// process and on any platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionSpacePointHash(String);

impl DimensionSpacePointHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DimensionSpacePointHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable coordinate in the content variation space,
/// e.g. `{"language": "de", "market": "ch"}`.
///
/// Identity is the set of coordinates; the hash is computed once on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct DimensionSpacePoint {
    coordinates: BTreeMap<String, String>,
    hash: DimensionSpacePointHash,
}

impl DimensionSpacePoint {
    pub fn new(coordinates: BTreeMap<String, String>) -> Self {
        let hash = compute_hash(&coordinates);
        Self { coordinates, hash }
    }

    /// The point of a repository without dimensions.
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn coordinates(&self) -> &BTreeMap<String, String> {
        &self.coordinates
    }

    pub fn coordinate(&self, dimension: &str) -> Option<&str> {
        self.coordinates.get(dimension).map(String::as_str)
    }

    /// Copy of this point with one coordinate replaced.
    pub fn with_coordinate(&self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        let mut coordinates = self.coordinates.clone();
        coordinates.insert(dimension.into(), value.into());
        Self::new(coordinates)
    }

    pub fn hash(&self) -> &DimensionSpacePointHash {
        &self.hash
    }

    /// Canonical JSON form; keys are sorted.
    pub fn to_json(&self) -> String {
        canonical_json(&self.coordinates)
    }
}

impl From<BTreeMap<String, String>> for DimensionSpacePoint {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::new(value)
    }
}

impl From<DimensionSpacePoint> for BTreeMap<String, String> {
    fn from(value: DimensionSpacePoint) -> Self {
        value.coordinates
    }
}

impl core::fmt::Display for DimensionSpacePoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// The dimension space point a node variant originates in.
///
/// A variant is "occupied" at its origin and may "cover" further points
/// (its specializations) until those get their own variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginDimensionSpacePoint(DimensionSpacePoint);

impl OriginDimensionSpacePoint {
    pub fn new(point: DimensionSpacePoint) -> Self {
        Self(point)
    }

    pub fn empty() -> Self {
        Self(DimensionSpacePoint::empty())
    }

    pub fn to_dimension_space_point(&self) -> DimensionSpacePoint {
        self.0.clone()
    }

    pub fn as_dimension_space_point(&self) -> &DimensionSpacePoint {
        &self.0
    }

    pub fn hash(&self) -> &DimensionSpacePointHash {
        self.0.hash()
    }
}

impl From<DimensionSpacePoint> for OriginDimensionSpacePoint {
    fn from(value: DimensionSpacePoint) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for OriginDimensionSpacePoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

fn canonical_json(coordinates: &BTreeMap<String, String>) -> String {
    // BTreeMap serialises in key order; serialising a map of strings cannot fail.
    serde_json::to_string(coordinates).unwrap_or_default()
}

fn compute_hash(coordinates: &BTreeMap<String, String>) -> DimensionSpacePointHash {
    let hex = blake3::hash(canonical_json(coordinates).as_bytes()).to_hex();
    DimensionSpacePointHash(hex.as_str()[..32].to_string())
}
