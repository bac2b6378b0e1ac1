use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::SequenceNumber;
use crate::{Event, EventEnvelope};

/// Failure inside a projection.
///
/// Apply failures are isolated to the subscription that hit them; they never
/// travel back into the write path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("projection setup failed: {0}")]
    Setup(String),

    #[error("failed to apply event: {0}")]
    Apply(String),

    #[error("event {found} arrived after {last}; events must be applied in sequence order")]
    NonMonotonicSequence {
        last: SequenceNumber,
        found: SequenceNumber,
    },
}

impl ProjectionError {
    pub fn apply(msg: impl Into<String>) -> Self {
        Self::Apply(msg.into())
    }
}

/// Health of a projection's storage, as reported to ops tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionStatus {
    Ok,
    SetupRequired(String),
    ReplayRequired(String),
    Error(String),
}

impl ProjectionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProjectionStatus::Ok)
    }

    /// Free-text detail; empty for `Ok`.
    pub fn details(&self) -> &str {
        match self {
            ProjectionStatus::Ok => "",
            ProjectionStatus::SetupRequired(d)
            | ProjectionStatus::ReplayRequired(d)
            | ProjectionStatus::Error(d) => d,
        }
    }
}

/// A projection builds a read model from the ordered event log.
///
/// Read models are **disposable**: truncating one and replaying the log from
/// the first event must reproduce identical state. Events are the source of
/// truth; read models are optimized views.
///
/// ## Lifecycle
///
/// 1. **Setup**: provision storage (idempotent)
/// 2. **Apply**: fold events in strictly increasing sequence order
/// 3. **Reset**: drop all derived state before a replay
///
/// Delivery order and at-most-once application are guaranteed by whoever drives
/// the projection (the subscription engine or a [`crate::ProjectionRunner`]);
/// `apply` itself is not required to tolerate reapplication.
///
/// ## Not applicable events
///
/// An event that refers to state the projection does not track (a parent it
/// never saw, a node type it ignores) is skipped, not an error.
pub trait Projection {
    type Ev: Event;

    /// Provision storage. Must be safe to call repeatedly.
    fn setup(&mut self) -> Result<(), ProjectionError> {
        Ok(())
    }

    fn status(&self) -> ProjectionStatus {
        ProjectionStatus::Ok
    }

    /// Drop all derived state.
    fn reset(&mut self) -> Result<(), ProjectionError>;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) -> Result<(), ProjectionError>;
}

impl<P> Projection for Box<P>
where
    P: Projection + ?Sized,
{
    type Ev = P::Ev;

    fn setup(&mut self) -> Result<(), ProjectionError> {
        (**self).setup()
    }

    fn status(&self) -> ProjectionStatus {
        (**self).status()
    }

    fn reset(&mut self) -> Result<(), ProjectionError> {
        (**self).reset()
    }

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) -> Result<(), ProjectionError> {
        (**self).apply(envelope)
    }
}
