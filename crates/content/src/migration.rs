//! Node migrations: bulk changes expressed as ordinary commands.
//!
//! A migration selects every node aggregate of one type in a workspace and
//! translates its transformations into commands. Running the commands is the
//! caller's job, so migrated content goes through the same constraint checks
//! and events as any other edit.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use escr_core::{DomainError, DomainResult, NodeTypeName, WorkspaceName};

use crate::commands::{ChangeNodeAggregateType, ContentCommand, SetNodeProperties, TypeChangeStrategy};
use crate::property::PropertyValues;
use crate::read_model::ContentGraphReadModel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodeMigrationTransformation {
    ChangeNodeType {
        new_type: NodeTypeName,
        #[serde(default)]
        strategy: TypeChangeStrategy,
    },
    /// Unset a property on every variant that has it.
    RemoveProperty { property: String },
    /// Rewrite a string (or array of strings) property: the current value is
    /// substituted into `new_serialized_value`, then `search` is replaced.
    ChangePropertyValue {
        property: String,
        #[serde(default = "current_value_placeholder")]
        new_serialized_value: String,
        #[serde(default)]
        search: String,
        #[serde(default)]
        replace: String,
        #[serde(default = "current_value_placeholder")]
        current_value_placeholder: String,
    },
}

fn current_value_placeholder() -> String {
    "{current}".to_string()
}

/// Settings of a [`NodeMigrationTransformation::ChangePropertyValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValueChange {
    pub new_serialized_value: String,
    pub search: String,
    pub replace: String,
    pub current_value_placeholder: String,
}

impl Default for PropertyValueChange {
    fn default() -> Self {
        Self {
            new_serialized_value: current_value_placeholder(),
            search: String::new(),
            replace: String::new(),
            current_value_placeholder: current_value_placeholder(),
        }
    }
}

impl PropertyValueChange {
    pub fn template(mut self, new_serialized_value: impl Into<String>) -> Self {
        self.new_serialized_value = new_serialized_value.into();
        self
    }

    pub fn search_replace(mut self, search: impl Into<String>, replace: impl Into<String>) -> Self {
        self.search = search.into();
        self.replace = replace.into();
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.current_value_placeholder = placeholder.into();
        self
    }
}

/// Template substitution then search/replace. An empty pattern matches nothing.
fn rewrite(template: &str, placeholder: &str, current: &str, search: &str, replace: &str) -> String {
    let substituted = if placeholder.is_empty() {
        template.to_string()
    } else {
        template.replace(placeholder, current)
    };
    if search.is_empty() {
        substituted
    } else {
        substituted.replace(search, replace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMigration {
    pub node_type: NodeTypeName,
    pub transformations: Vec<NodeMigrationTransformation>,
}

impl NodeMigration {
    pub fn new(node_type: NodeTypeName) -> Self {
        Self {
            node_type,
            transformations: Vec::new(),
        }
    }

    pub fn change_node_type(mut self, new_type: NodeTypeName, strategy: TypeChangeStrategy) -> Self {
        self.transformations
            .push(NodeMigrationTransformation::ChangeNodeType { new_type, strategy });
        self
    }

    pub fn remove_property(mut self, property: impl Into<String>) -> Self {
        self.transformations.push(NodeMigrationTransformation::RemoveProperty {
            property: property.into(),
        });
        self
    }

    pub fn change_property_value(mut self, property: impl Into<String>, change: PropertyValueChange) -> Self {
        self.transformations.push(NodeMigrationTransformation::ChangePropertyValue {
            property: property.into(),
            new_serialized_value: change.new_serialized_value,
            search: change.search,
            replace: change.replace,
            current_value_placeholder: change.current_value_placeholder,
        });
        self
    }

    /// Commands for every matching aggregate, transformations in declaration order.
    pub fn commands(
        &self,
        workspace_name: &WorkspaceName,
        read_model: &dyn ContentGraphReadModel,
    ) -> DomainResult<Vec<ContentCommand>> {
        let workspace = read_model.find_workspace(workspace_name).ok_or_else(|| {
            DomainError::constraint(format!("workspace '{workspace_name}' does not exist"))
        })?;
        let aggregates =
            read_model.find_node_aggregates_by_type(&workspace.current_content_stream_id, &self.node_type);

        let mut commands = Vec::new();
        for aggregate in &aggregates {
            for transformation in &self.transformations {
                match transformation {
                    NodeMigrationTransformation::ChangeNodeType { new_type, strategy } => {
                        commands.push(ContentCommand::ChangeNodeAggregateType(ChangeNodeAggregateType {
                            workspace_name: workspace_name.clone(),
                            node_aggregate_id: aggregate.id().clone(),
                            new_node_type_name: new_type.clone(),
                            strategy: *strategy,
                        }));
                    }
                    NodeMigrationTransformation::RemoveProperty { property } => {
                        for variant in aggregate.variants().filter(|v| v.properties.contains(property)) {
                            commands.push(ContentCommand::SetNodeProperties(SetNodeProperties {
                                workspace_name: workspace_name.clone(),
                                node_aggregate_id: aggregate.id().clone(),
                                origin_dimension_space_point: variant.origin.clone(),
                                property_values: PropertyValues::new().with(property.clone(), JsonValue::Null),
                            }));
                        }
                    }
                    NodeMigrationTransformation::ChangePropertyValue {
                        property,
                        new_serialized_value,
                        search,
                        replace,
                        current_value_placeholder,
                    } => {
                        for variant in aggregate.variants() {
                            let Some(current) = variant.properties.get(property) else {
                                continue;
                            };
                            let apply = |value: &str| {
                                rewrite(new_serialized_value, current_value_placeholder, value, search, replace)
                            };
                            let changed = match current {
                                JsonValue::String(value) => JsonValue::String(apply(value)),
                                JsonValue::Array(items) => JsonValue::Array(
                                    items
                                        .iter()
                                        .map(|item| match item {
                                            JsonValue::String(value) => JsonValue::String(apply(value)),
                                            other => other.clone(),
                                        })
                                        .collect(),
                                ),
                                _ => {
                                    return Err(DomainError::validation(format!(
                                        "property '{property}' of node aggregate '{}' is neither a string nor an array",
                                        aggregate.id()
                                    )));
                                }
                            };
                            commands.push(ContentCommand::SetNodeProperties(SetNodeProperties {
                                workspace_name: workspace_name.clone(),
                                node_aggregate_id: aggregate.id().clone(),
                                origin_dimension_space_point: variant.origin.clone(),
                                property_values: PropertyValues::new().with(property.clone(), changed),
                            }));
                        }
                    }
                }
            }
        }
        Ok(commands)
    }
}
