use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Serialized property values of a node variant.
///
/// In commands a `null` value means "unset this property"; projected state
/// never stores nulls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyValues(BTreeMap<String, JsonValue>);

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(JsonValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `values`, then drop every name in `unset`.
    pub fn merge(&mut self, values: &PropertyValues, unset: &[String]) {
        for (name, value) in &values.0 {
            self.0.insert(name.clone(), value.clone());
        }
        for name in unset {
            self.0.remove(name);
        }
    }

    /// Split command input into values to write and names to unset.
    pub fn split_unset(&self) -> (PropertyValues, Vec<String>) {
        let mut set = PropertyValues::new();
        let mut unset = Vec::new();
        for (name, value) in &self.0 {
            if value.is_null() {
                unset.push(name.clone());
            } else {
                set.0.insert(name.clone(), value.clone());
            }
        }
        (set, unset)
    }

    /// Case-insensitive substring match over all string values.
    pub fn matches_search_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.0.values().any(|v| value_contains(v, &term))
    }
}

fn value_contains(value: &JsonValue, term: &str) -> bool {
    match value {
        JsonValue::String(s) => s.to_lowercase().contains(term),
        JsonValue::Array(items) => items.iter().any(|v| value_contains(v, term)),
        JsonValue::Object(map) => map.values().any(|v| value_contains(v, term)),
        JsonValue::Number(n) => n.to_string().contains(term),
        _ => false,
    }
}

impl FromIterator<(String, JsonValue)> for PropertyValues {
    fn from_iter<T: IntoIterator<Item = (String, JsonValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nulls_become_unsets() {
        let input = PropertyValues::new()
            .with("title", "Home")
            .with("uriPathSegment", JsonValue::Null);
        let (set, unset) = input.split_unset();
        assert_eq!(set, PropertyValues::new().with("title", "Home"));
        assert_eq!(unset, vec!["uriPathSegment".to_string()]);
    }

    #[test]
    fn merge_overwrites_then_unsets() {
        let mut values = PropertyValues::new().with("a", 1).with("b", 2);
        values.merge(&PropertyValues::new().with("a", 3), &["b".to_string()]);
        assert_eq!(values, PropertyValues::new().with("a", 3));
    }

    #[test]
    fn search_term_is_case_insensitive_and_nested() {
        let values = PropertyValues::new()
            .with("title", "Welcome Home")
            .with("tags", json!(["News", "Blog"]));
        assert!(values.matches_search_term("welcome"));
        assert!(values.matches_search_term("blog"));
        assert!(!values.matches_search_term("missing"));
    }
}
