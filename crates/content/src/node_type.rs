//! Node type definitions and their structural rules.
//!
//! Node types form a multiple-inheritance hierarchy. Everything a handler asks
//! about a type (is it a document, may it hold this child, does it declare
//! this property) is resolved against the fully merged definition, so
//! inheritance is computed once at construction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use escr_core::{ConfigurationError, NodeTypeName};

/// Names the core itself relies on.
pub mod well_known {
    /// Root type every site lives under.
    pub const SITES: &str = "Cms:Sites";
    pub const SITE: &str = "Cms:Site";
    pub const DOCUMENT: &str = "Cms:Document";
    pub const SHORTCUT: &str = "Cms:Shortcut";
}

/// Wildcard key in child constraints.
const ANY_TYPE: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyConfig {
    #[serde(rename = "type", default = "default_property_type")]
    pub property_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
}

fn default_property_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeConfig {
    #[serde(default)]
    pub super_types: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub root: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyConfig>,
    /// Child constraints: type name (or `*`) to allowed flag.
    #[serde(default)]
    pub child_constraints: BTreeMap<String, bool>,
}

/// A node type with inheritance already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeType {
    name: NodeTypeName,
    super_types: Vec<String>,
    /// Every type this one is, itself included.
    lineage: BTreeSet<String>,
    is_abstract: bool,
    is_root: bool,
    properties: BTreeMap<String, PropertyConfig>,
    child_constraints: BTreeMap<String, bool>,
}

impl NodeType {
    pub fn name(&self) -> &NodeTypeName {
        &self.name
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn is_of_type(&self, name: &str) -> bool {
        self.lineage.contains(name)
    }

    pub fn declares_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyConfig> {
        &self.properties
    }

    pub fn default_value(&self, name: &str) -> Option<&JsonValue> {
        self.properties.get(name).and_then(|p| p.default_value.as_ref())
    }
}

/// Registry of all configured node types.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeManager {
    types: BTreeMap<String, NodeType>,
}

impl NodeTypeManager {
    pub fn from_config(configs: &BTreeMap<String, NodeTypeConfig>) -> Result<Self, ConfigurationError> {
        for (name, config) in configs {
            NodeTypeName::new(name.clone())
                .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
            for super_type in &config.super_types {
                if !configs.contains_key(super_type) {
                    return Err(ConfigurationError::UnknownSuperType {
                        node_type: name.clone(),
                        super_type: super_type.clone(),
                    });
                }
            }
        }

        let mut types = BTreeMap::new();
        for name in configs.keys() {
            let lineage = resolve_lineage(name, configs)?;
            // Ancestors first so a type's own declarations win.
            let mut ordered: Vec<&String> = lineage.iter().filter(|t| *t != name).collect();
            ordered.sort_by_key(|t| lineage_depth(t, configs));
            ordered.reverse();
            ordered.push(name);

            let mut properties = BTreeMap::new();
            let mut child_constraints = BTreeMap::new();
            for type_name in ordered {
                if let Some(config) = configs.get(type_name) {
                    properties.extend(config.properties.clone());
                    child_constraints.extend(config.child_constraints.clone());
                }
            }

            let config = &configs[name];
            let node_type = NodeType {
                name: NodeTypeName::new(name.clone())
                    .map_err(|e| ConfigurationError::Invalid(e.to_string()))?,
                super_types: config.super_types.clone(),
                lineage,
                is_abstract: config.is_abstract,
                is_root: config.root,
                properties,
                child_constraints,
            };
            types.insert(name.clone(), node_type);
        }

        Ok(Self { types })
    }

    pub fn get(&self, name: &NodeTypeName) -> Option<&NodeType> {
        self.types.get(name.as_str())
    }

    pub fn has(&self, name: &NodeTypeName) -> bool {
        self.types.contains_key(name.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Whether `name` is `super_type` or inherits from it. Unknown types are of no type.
    pub fn is_of_type(&self, name: &NodeTypeName, super_type: &str) -> bool {
        self.get(name).is_some_and(|t| t.is_of_type(super_type))
    }

    /// Whether nodes of `parent` may hold children of `child`.
    ///
    /// The most specific matching constraint wins: the child's own name, then
    /// its closest ancestor, then the `*` wildcard. No matching entry allows.
    pub fn allows_child(&self, parent: &NodeTypeName, child: &NodeTypeName) -> bool {
        let (Some(parent), Some(child_type)) = (self.get(parent), self.get(child)) else {
            return false;
        };
        if parent.child_constraints.is_empty() {
            return true;
        }
        let mut best: Option<(usize, bool)> = None;
        for (key, allowed) in &parent.child_constraints {
            if key == ANY_TYPE || !child_type.is_of_type(key) {
                continue;
            }
            let distance = self.distance(child_type.name.as_str(), key);
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, *allowed));
            }
        }
        match best {
            Some((_, allowed)) => allowed,
            None => parent.child_constraints.get(ANY_TYPE).copied().unwrap_or(true),
        }
    }

    fn distance(&self, from: &str, to: &str) -> usize {
        let mut frontier = vec![from.to_string()];
        let mut seen = BTreeSet::new();
        let mut depth = 0;
        while !frontier.is_empty() {
            if frontier.iter().any(|t| t == to) {
                return depth;
            }
            let mut next = Vec::new();
            for name in frontier {
                if !seen.insert(name.clone()) {
                    continue;
                }
                if let Some(t) = self.types.get(&name) {
                    next.extend(t.super_types.iter().cloned());
                }
            }
            frontier = next;
            depth += 1;
        }
        usize::MAX
    }
}

fn resolve_lineage(
    name: &str,
    configs: &BTreeMap<String, NodeTypeConfig>,
) -> Result<BTreeSet<String>, ConfigurationError> {
    let mut lineage = BTreeSet::new();
    let mut stack = vec![(name.to_string(), vec![name.to_string()])];
    while let Some((current, path)) = stack.pop() {
        lineage.insert(current.clone());
        let Some(config) = configs.get(&current) else {
            continue;
        };
        for super_type in &config.super_types {
            if path.contains(super_type) {
                return Err(ConfigurationError::CyclicNodeTypeInheritance(super_type.clone()));
            }
            let mut next_path = path.clone();
            next_path.push(super_type.clone());
            stack.push((super_type.clone(), next_path));
        }
    }
    Ok(lineage)
}

/// Longest super type chain above `name`.
fn lineage_depth(name: &str, configs: &BTreeMap<String, NodeTypeConfig>) -> usize {
    configs
        .get(name)
        .map(|c| {
            c.super_types
                .iter()
                .map(|s| 1 + lineage_depth(s, configs))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}
