use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use escr_core::DomainError;

/// An inheritable label on a node subtree, e.g. `disabled`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubtreeTag(String);

impl SubtreeTag {
    pub const DISABLED: &'static str = "disabled";

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= 36
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(DomainError::validation(format!("invalid subtree tag '{value}'")));
        }
        Ok(Self(value))
    }

    pub fn disabled() -> Self {
        Self(Self::DISABLED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SubtreeTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubtreeTag {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubtreeTag> for String {
    fn from(value: SubtreeTag) -> Self {
        value.0
    }
}

/// Tags in effect for a node: set on the node itself, or inherited from an ancestor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTags {
    pub explicit: BTreeSet<SubtreeTag>,
    pub inherited: BTreeSet<SubtreeTag>,
}

impl NodeTags {
    pub fn contains(&self, tag: &SubtreeTag) -> bool {
        self.explicit.contains(tag) || self.inherited.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty() && self.inherited.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &SubtreeTag> {
        self.explicit.union(&self.inherited)
    }
}
