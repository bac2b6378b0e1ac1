use serde::{Deserialize, Serialize};

use escr_core::{DomainError, NodeName};

/// A relative path of node names, e.g. `home/about-us`.
///
/// The empty path addresses the starting node itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath(Vec<NodeName>);

impl NodePath {
    pub fn new(segments: Vec<NodeName>) -> Self {
        Self(segments)
    }

    pub fn parse(path: &str) -> Result<Self, DomainError> {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(NodeName::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[NodeName] {
        &self.0
    }

    pub fn append(&self, name: NodeName) -> Self {
        let mut segments = self.0.clone();
        segments.push(name);
        Self(segments)
    }
}

impl core::fmt::Display for NodePath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(NodeName::as_str).collect();
        f.write_str(&joined.join("/"))
    }
}

impl TryFrom<String> for NodePath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodePath> for String {
    fn from(value: NodePath) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_joins_segments() {
        let path = NodePath::parse("/home/about-us/").unwrap();
        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.to_string(), "home/about-us");
    }

    #[test]
    fn empty_path_is_root() {
        assert!(NodePath::parse("").unwrap().is_root());
        assert!(NodePath::parse("/").unwrap().is_root());
    }
}
