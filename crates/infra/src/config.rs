//! Static repository configuration.
//!
//! Loaded once from JSON and validated eagerly: a repository is never built
//! from a configuration that fails any of the builders below.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use escr_content::{NodeTypeConfig, NodeTypeManager};
use escr_core::{ConfigurationError, ContentRepositoryId, SubscriptionId};
use escr_dimension::{ContentDimensionConfig, ContentDimensionSource, InterDimensionalVariationGraph};

pub const CONTENT_GRAPH_PROJECTION: &str = "contentGraph";
pub const DOCUMENT_URI_PATH_PROJECTION: &str = "documentUriPaths";

const KNOWN_PROJECTIONS: [&str; 2] = [CONTENT_GRAPH_PROJECTION, DOCUMENT_URI_PATH_PROJECTION];

fn default_projections() -> Vec<String> {
    KNOWN_PROJECTIONS.iter().map(|p| p.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRepositoryConfig {
    pub id: String,
    #[serde(default)]
    pub dimensions: Vec<ContentDimensionConfig>,
    #[serde(default)]
    pub node_types: BTreeMap<String, NodeTypeConfig>,
    /// Projections to register, by subscription id.
    #[serde(default = "default_projections")]
    pub projections: Vec<String>,
}

impl ContentRepositoryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::Invalid(format!("repository configuration is not valid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Runs every builder once so inconsistencies surface at load time.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.repository_id()?;
        self.variation_graph()?;
        self.node_type_manager()?;
        self.projection_ids()?;
        Ok(())
    }

    pub fn repository_id(&self) -> Result<ContentRepositoryId, ConfigurationError> {
        ContentRepositoryId::new(self.id.clone()).map_err(|e| ConfigurationError::Invalid(e.to_string()))
    }

    pub fn dimension_source(&self) -> Result<ContentDimensionSource, ConfigurationError> {
        ContentDimensionSource::from_config(&self.dimensions)
    }

    pub fn variation_graph(&self) -> Result<InterDimensionalVariationGraph, ConfigurationError> {
        Ok(InterDimensionalVariationGraph::new(self.dimension_source()?))
    }

    pub fn node_type_manager(&self) -> Result<NodeTypeManager, ConfigurationError> {
        NodeTypeManager::from_config(&self.node_types)
    }

    /// Configured projections in declaration order. The content graph is mandatory.
    pub fn projection_ids(&self) -> Result<Vec<SubscriptionId>, ConfigurationError> {
        let mut ids = Vec::with_capacity(self.projections.len());
        for name in &self.projections {
            if !KNOWN_PROJECTIONS.contains(&name.as_str()) {
                return Err(ConfigurationError::UnknownProjection(name.clone()));
            }
            let id = SubscriptionId::new(name.clone()).map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if !self.has_projection(CONTENT_GRAPH_PROJECTION) {
            return Err(ConfigurationError::Invalid(format!(
                "projection '{CONTENT_GRAPH_PROJECTION}' is required"
            )));
        }
        Ok(ids)
    }

    pub fn has_projection(&self, name: &str) -> bool {
        self.projections.iter().any(|p| p == name)
    }
}

#[cfg(test)]
mod tests {
    use escr_dimension::DimensionSpacePoint;

    use super::*;
    use crate::test_support::CONFIG;

    #[test]
    fn loads_dimensions_node_types_and_default_projections() {
        let config = ContentRepositoryConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.repository_id().unwrap().as_str(), "default");
        assert_eq!(
            config.projections,
            vec![CONTENT_GRAPH_PROJECTION.to_string(), DOCUMENT_URI_PATH_PROJECTION.to_string()]
        );

        let graph = config.variation_graph().unwrap();
        let gsw = DimensionSpacePoint::from_pairs([("language", "gsw")]);
        let de = DimensionSpacePoint::from_pairs([("language", "de")]);
        assert_eq!(graph.primary_generalization(&gsw).unwrap(), Some(de));

        let node_types = config.node_type_manager().unwrap();
        assert!(node_types.is_of_type(&"Acme:Page".parse().unwrap(), "Cms:Document"));
    }

    #[test]
    fn unknown_projections_are_rejected() {
        let json = r#"{ "id": "default", "projections": ["contentGraph", "searchIndex"] }"#;
        assert_eq!(
            ContentRepositoryConfig::from_json_str(json),
            Err(ConfigurationError::UnknownProjection("searchIndex".to_string()))
        );
    }

    #[test]
    fn the_content_graph_projection_is_required() {
        let json = r#"{ "id": "default", "projections": ["documentUriPaths"] }"#;
        assert!(matches!(
            ContentRepositoryConfig::from_json_str(json),
            Err(ConfigurationError::Invalid(_))
        ));
    }

    #[test]
    fn inconsistent_node_types_fail_at_load_time() {
        let json = r#"{ "id": "default", "nodeTypes": { "Acme:Page": { "superTypes": ["Cms:Missing"] } } }"#;
        assert_eq!(
            ContentRepositoryConfig::from_json_str(json),
            Err(ConfigurationError::UnknownSuperType {
                node_type: "Acme:Page".to_string(),
                super_type: "Cms:Missing".to_string(),
            })
        );
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        assert!(matches!(
            ContentRepositoryConfig::from_json_str("{ nope"),
            Err(ConfigurationError::Invalid(_))
        ));
    }
}
