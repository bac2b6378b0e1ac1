//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures a caller can act on (validation,
/// constraint checks, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A command was rejected because the current state does not allow it.
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Static configuration is inconsistent.
///
/// Raised while building dimension, node type or repository configuration.
/// These are fatal: a repository is never constructed from a configuration
/// that produced one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("dimension space point {0} is not part of the configured dimension space")]
    UnknownDimensionSpacePoint(String),

    #[error("dimension '{0}' is not configured")]
    UnknownDimension(String),

    #[error("dimension '{dimension}' has no value '{value}'")]
    UnknownDimensionValue { dimension: String, value: String },

    #[error("dimension '{dimension}' declares value '{value}' more than once")]
    DuplicateDimensionValue { dimension: String, value: String },

    #[error("dimension '{0}' has no values")]
    EmptyDimension(String),

    #[error("node type '{node_type}' references unknown super type '{super_type}'")]
    UnknownSuperType { node_type: String, super_type: String },

    #[error("node type '{0}' inherits from itself")]
    CyclicNodeTypeInheritance(String),

    #[error("unknown projection '{0}'")]
    UnknownProjection(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
