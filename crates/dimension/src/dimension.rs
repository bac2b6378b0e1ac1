//! Content dimensions and their value trees, built from static configuration.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use escr_core::ConfigurationError;

use crate::point::DimensionSpacePoint;
use crate::set::DimensionSpacePointSet;

/// Configuration of one dimension, e.g. `language` with `de -> de_CH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDimensionConfig {
    pub id: String,
    pub values: Vec<ContentDimensionValueConfig>,
}

/// One dimension value and the values specializing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDimensionValueConfig {
    pub value: String,
    #[serde(default)]
    pub specializations: Vec<ContentDimensionValueConfig>,
}

impl ContentDimensionValueConfig {
    pub fn leaf(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            specializations: Vec::new(),
        }
    }

    pub fn with_specializations(
        value: impl Into<String>,
        specializations: Vec<ContentDimensionValueConfig>,
    ) -> Self {
        Self {
            value: value.into(),
            specializations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DimensionValue {
    value: String,
    generalization: Option<String>,
    depth: u32,
}

/// A validated dimension: its values in configuration order plus the
/// generalization edges between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDimension {
    id: String,
    values: Vec<DimensionValue>,
    index: HashMap<String, usize>,
}

impl ContentDimension {
    pub fn from_config(config: &ContentDimensionConfig) -> Result<Self, ConfigurationError> {
        if config.values.is_empty() {
            return Err(ConfigurationError::EmptyDimension(config.id.clone()));
        }
        let mut dimension = Self {
            id: config.id.clone(),
            values: Vec::new(),
            index: HashMap::new(),
        };
        for value in &config.values {
            dimension.add_value(value, None, 0)?;
        }
        Ok(dimension)
    }

    fn add_value(
        &mut self,
        config: &ContentDimensionValueConfig,
        generalization: Option<&str>,
        depth: u32,
    ) -> Result<(), ConfigurationError> {
        if config.value.trim().is_empty() {
            return Err(ConfigurationError::Invalid(format!(
                "dimension '{}' contains an empty value",
                self.id
            )));
        }
        if self.index.contains_key(&config.value) {
            return Err(ConfigurationError::DuplicateDimensionValue {
                dimension: self.id.clone(),
                value: config.value.clone(),
            });
        }
        self.index.insert(config.value.clone(), self.values.len());
        self.values.push(DimensionValue {
            value: config.value.clone(),
            generalization: generalization.map(str::to_string),
            depth,
        });
        for specialization in &config.specializations {
            self.add_value(specialization, Some(&config.value), depth + 1)?;
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|v| v.value.as_str())
    }

    pub fn has_value(&self, value: &str) -> bool {
        self.index.contains_key(value)
    }

    /// Distance from the value's root; root values have depth 0.
    pub fn depth(&self, value: &str) -> Option<u32> {
        self.lookup(value).map(|v| v.depth)
    }

    pub fn generalization(&self, value: &str) -> Option<&str> {
        self.lookup(value).and_then(|v| v.generalization.as_deref())
    }

    /// `true` if `general` equals `special` or lies on its generalization chain.
    pub fn is_same_or_generalization_of(&self, general: &str, special: &str) -> bool {
        let mut current = Some(special);
        while let Some(value) = current {
            if value == general {
                return true;
            }
            current = self.generalization(value);
        }
        false
    }

    fn lookup(&self, value: &str) -> Option<&DimensionValue> {
        self.index.get(value).map(|&idx| &self.values[idx])
    }
}

/// All configured dimensions, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDimensionSource {
    dimensions: Vec<ContentDimension>,
}

impl ContentDimensionSource {
    pub fn from_config(configs: &[ContentDimensionConfig]) -> Result<Self, ConfigurationError> {
        let mut dimensions: Vec<ContentDimension> = Vec::with_capacity(configs.len());
        for config in configs {
            if dimensions.iter().any(|d| d.id == config.id) {
                return Err(ConfigurationError::Invalid(format!(
                    "dimension '{}' is configured twice",
                    config.id
                )));
            }
            dimensions.push(ContentDimension::from_config(config)?);
        }
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> &[ContentDimension] {
        &self.dimensions
    }

    pub fn dimension(&self, id: &str) -> Option<&ContentDimension> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    /// Checks that the point names every dimension exactly once with a known value.
    pub fn validate_point(&self, point: &DimensionSpacePoint) -> Result<(), ConfigurationError> {
        if point.coordinates().len() != self.dimensions.len() {
            return Err(ConfigurationError::UnknownDimensionSpacePoint(point.to_json()));
        }
        for (dimension_id, value) in point.coordinates() {
            let dimension = self
                .dimension(dimension_id)
                .ok_or_else(|| ConfigurationError::UnknownDimension(dimension_id.clone()))?;
            if !dimension.has_value(value) {
                return Err(ConfigurationError::UnknownDimensionValue {
                    dimension: dimension_id.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// The cartesian product of all dimension values.
    ///
    /// A repository without dimensions has exactly one point, the empty one.
    pub fn allowed_points(&self) -> DimensionSpacePointSet {
        let mut combinations: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];
        for dimension in &self.dimensions {
            let mut next = Vec::with_capacity(combinations.len() * dimension.values.len());
            for combination in &combinations {
                for value in dimension.values() {
                    let mut extended = combination.clone();
                    extended.insert(dimension.id.clone(), value.to_string());
                    next.push(extended);
                }
            }
            combinations = next;
        }
        combinations.into_iter().map(DimensionSpacePoint::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn language_config() -> ContentDimensionConfig {
        ContentDimensionConfig {
            id: "language".to_string(),
            values: vec![
                ContentDimensionValueConfig::with_specializations(
                    "de",
                    vec![ContentDimensionValueConfig::leaf("gsw")],
                ),
                ContentDimensionValueConfig::leaf("en"),
            ],
        }
    }

    #[test]
    fn builds_value_tree() {
        let dimension = ContentDimension::from_config(&language_config()).unwrap();
        assert_eq!(dimension.values().collect::<Vec<_>>(), vec!["de", "gsw", "en"]);
        assert_eq!(dimension.depth("gsw"), Some(1));
        assert_eq!(dimension.generalization("gsw"), Some("de"));
        assert!(dimension.is_same_or_generalization_of("de", "gsw"));
        assert!(!dimension.is_same_or_generalization_of("gsw", "de"));
        assert!(!dimension.is_same_or_generalization_of("en", "gsw"));
    }

    #[test]
    fn rejects_duplicate_values() {
        let config = ContentDimensionConfig {
            id: "language".to_string(),
            values: vec![
                ContentDimensionValueConfig::with_specializations(
                    "de",
                    vec![ContentDimensionValueConfig::leaf("de")],
                ),
            ],
        };
        assert!(matches!(
            ContentDimension::from_config(&config),
            Err(ConfigurationError::DuplicateDimensionValue { .. })
        ));
    }

    #[test]
    fn allowed_points_are_the_cartesian_product() {
        let market = ContentDimensionConfig {
            id: "market".to_string(),
            values: vec![
                ContentDimensionValueConfig::leaf("eu"),
                ContentDimensionValueConfig::leaf("us"),
            ],
        };
        let source = ContentDimensionSource::from_config(&[language_config(), market]).unwrap();
        assert_eq!(source.allowed_points().len(), 6);
    }

    #[test]
    fn no_dimensions_means_one_empty_point() {
        let source = ContentDimensionSource::from_config(&[]).unwrap();
        let points = source.allowed_points();
        assert_eq!(points.len(), 1);
        assert!(points.contains(&DimensionSpacePoint::empty()));
    }

    #[test]
    fn validates_points_against_configuration() {
        let source = ContentDimensionSource::from_config(&[language_config()]).unwrap();
        assert!(source
            .validate_point(&DimensionSpacePoint::from_pairs([("language", "gsw")]))
            .is_ok());
        assert!(matches!(
            source.validate_point(&DimensionSpacePoint::from_pairs([("language", "fr")])),
            Err(ConfigurationError::UnknownDimensionValue { .. })
        ));
        assert!(source.validate_point(&DimensionSpacePoint::empty()).is_err());
    }
}
