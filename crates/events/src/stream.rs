//! Stream names and log positions.

use serde::{Deserialize, Serialize};

use escr_core::{ContentStreamId, WorkspaceName};

/// Position of an event in the global, repository-wide log.
///
/// Sequence numbers start at 1; [`SequenceNumber::none`] (0) means
/// "nothing applied yet".
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn none() -> Self {
        Self(0)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Name of an event stream.
///
/// Streams are namespaced: one per content stream (`ContentStream:<id>`) and
/// one per workspace lifecycle (`Workspace:<name>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamName(String);

impl StreamName {
    pub const CONTENT_STREAM_PREFIX: &'static str = "ContentStream:";
    pub const WORKSPACE_PREFIX: &'static str = "Workspace:";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn for_content_stream(id: &ContentStreamId) -> Self {
        Self(format!("{}{}", Self::CONTENT_STREAM_PREFIX, id))
    }

    pub fn for_workspace(name: &WorkspaceName) -> Self {
        Self(format!("{}{}", Self::WORKSPACE_PREFIX, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_content_stream(&self) -> bool {
        self.0.starts_with(Self::CONTENT_STREAM_PREFIX)
    }
}

impl core::fmt::Display for StreamName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
