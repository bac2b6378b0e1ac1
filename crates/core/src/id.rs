//! Strongly-typed identifiers used across the content repository.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Stable identity of a logical node across all of its dimension variants
/// and across workspaces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAggregateId(String);

/// Identifier of an isolated, append-only branch of content history.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentStreamId(String);

/// Name of a workspace (`live`, `user-admin`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceName(String);

/// Fully qualified node type name, e.g. `Cms:Document`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeTypeName(String);

/// Name of a node below its parent, used for path lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeName(String);

/// Identifier of a projection subscription.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionId(String);

/// Identifier of one content repository instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentRepositoryId(String);

/// Identifier of a committed (or about to be committed) event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal, $validate:path) => {
        impl $t {
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                $validate(&value)
                    .map_err(|reason| DomainError::invalid_id(format!("{} '{}': {}", $name, value, reason)))?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_uuid_newtype!(EventId, "EventId");

impl_string_newtype!(NodeAggregateId, "NodeAggregateId", validate_path_segment);
impl_string_newtype!(ContentStreamId, "ContentStreamId", validate_path_segment);
impl_string_newtype!(WorkspaceName, "WorkspaceName", validate_workspace_name);
impl_string_newtype!(NodeTypeName, "NodeTypeName", validate_not_empty);
impl_string_newtype!(NodeName, "NodeName", validate_path_segment);
impl_string_newtype!(SubscriptionId, "SubscriptionId", validate_not_empty);
impl_string_newtype!(ContentRepositoryId, "ContentRepositoryId", validate_repository_id);

impl NodeAggregateId {
    /// Generate a fresh, time-ordered node aggregate id.
    pub fn create() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl ContentStreamId {
    /// Generate a fresh, time-ordered content stream id.
    pub fn create() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl WorkspaceName {
    pub const LIVE: &'static str = "live";

    pub fn live() -> Self {
        Self(Self::LIVE.to_string())
    }

    pub fn is_live(&self) -> bool {
        self.0 == Self::LIVE
    }
}

fn validate_not_empty(value: &str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        return Err("must not be empty");
    }
    Ok(())
}

// Ids are joined with '/' into hierarchy paths.
fn validate_path_segment(value: &str) -> Result<(), &'static str> {
    validate_not_empty(value)?;
    if value.contains('/') {
        return Err("must not contain '/'");
    }
    if value.len() > 255 {
        return Err("must not be longer than 255 characters");
    }
    Ok(())
}

fn validate_workspace_name(value: &str) -> Result<(), &'static str> {
    validate_not_empty(value)?;
    if value.len() > 36 {
        return Err("must not be longer than 36 characters");
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("may only contain lowercase letters, digits and '-'");
    }
    if value.starts_with('-') {
        return Err("must start with a letter or digit");
    }
    Ok(())
}

fn validate_repository_id(value: &str) -> Result<(), &'static str> {
    validate_not_empty(value)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err("may only contain lowercase letters, digits and '_'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_aggregate_ids_reject_slashes() {
        assert!(NodeAggregateId::new("sir-david").is_ok());
        assert!(matches!(
            NodeAggregateId::new("a/b"),
            Err(DomainError::InvalidId(_))
        ));
        assert!(NodeAggregateId::new("  ").is_err());
    }

    #[test]
    fn workspace_names_are_lowercase_slugs() {
        assert!(WorkspaceName::new("user-admin").is_ok());
        assert!(WorkspaceName::new("User").is_err());
        assert!(WorkspaceName::new("-leading").is_err());
        assert!(WorkspaceName::live().is_live());
    }

    #[test]
    fn string_ids_validate_on_deserialize() {
        let ok: NodeAggregateId = serde_json::from_str("\"nody\"").unwrap();
        assert_eq!(ok.as_str(), "nody");
        assert!(serde_json::from_str::<NodeAggregateId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"nody\"");
    }

    #[test]
    fn created_ids_are_unique() {
        assert_ne!(ContentStreamId::create(), ContentStreamId::create());
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn event_ids_parse_from_uuid_strings() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<EventId>().is_err());
    }
}
