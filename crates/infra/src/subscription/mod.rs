//! Subscriptions: which projection has seen how much of the event log.
//!
//! ```text
//!            setup                boot / replay
//!   (none) ───────> NEW ──> BOOTING ─────────────> ACTIVE <──────┐
//!                                                   │   ▲        │ reactivate
//!                                     apply failed  ▼   │        │
//!                                                  ERROR ─┐      │
//!                                                         ▼      │
//!                  projection no longer registered ──> DETACHED ─┘
//! ```
//!
//! A subscription's position is the sequence number of the last event its
//! projection applied successfully. Positions only move forward, except
//! through an explicit reset or replay.

pub mod engine;
pub mod postgres;
pub mod status;
pub mod store;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use escr_core::SubscriptionId;
use escr_events::SequenceNumber;

use crate::event_store::EventStoreError;

pub use engine::{ReplayOptions, ReplayProgress, Subscriber, SubscriptionEngine};
pub use postgres::PostgresSubscriptionStore;
pub use status::SubscriptionStatusReport;
pub use store::{InMemorySubscriptionStore, SubscriptionStore};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    New,
    Booting,
    Active,
    Error,
    Detached,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::New => "NEW",
            SubscriptionStatus::Booting => "BOOTING",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Error => "ERROR",
            SubscriptionStatus::Detached => "DETACHED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(SubscriptionStatus::New),
            "BOOTING" => Some(SubscriptionStatus::Booting),
            "ACTIVE" => Some(SubscriptionStatus::Active),
            "ERROR" => Some(SubscriptionStatus::Error),
            "DETACHED" => Some(SubscriptionStatus::Detached),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored state of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub status: SubscriptionStatus,
    pub position: SequenceNumber,
    /// Message of the failure that put the subscription into `Error`.
    pub error: Option<String>,
    pub last_status_change: DateTime<Utc>,
}

impl Subscription {
    pub fn new(id: SubscriptionId) -> Self {
        Self {
            id,
            status: SubscriptionStatus::New,
            position: SequenceNumber::none(),
            error: None,
            last_status_change: Utc::now(),
        }
    }

    /// Move to `status`, clearing any previous error.
    pub fn transition(&mut self, status: SubscriptionStatus) {
        if self.status != status {
            self.last_status_change = Utc::now();
        }
        self.status = status;
        self.error = None;
    }

    /// Move to `Error`; the position stays at the last success.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.transition(SubscriptionStatus::Error);
        self.error = Some(message.into());
    }
}

/// Selects subscriptions. Empty sets select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionCriteria {
    pub ids: BTreeSet<SubscriptionId>,
    pub statuses: BTreeSet<SubscriptionStatus>,
}

impl SubscriptionCriteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: impl IntoIterator<Item = SubscriptionId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            statuses: BTreeSet::new(),
        }
    }

    pub fn with_statuses(statuses: impl IntoIterator<Item = SubscriptionStatus>) -> Self {
        Self {
            ids: BTreeSet::new(),
            statuses: statuses.into_iter().collect(),
        }
    }

    pub fn matches(&self, subscription: &Subscription) -> bool {
        (self.ids.is_empty() || self.ids.contains(&subscription.id))
            && (self.statuses.is_empty() || self.statuses.contains(&subscription.status))
    }
}

/// One projection that failed during a catch-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFailure {
    pub subscription_id: SubscriptionId,
    /// The event that could not be applied.
    pub sequence_number: SequenceNumber,
    pub message: String,
}

/// Outcome of a catch-up, boot, reactivation or replay.
///
/// `processed` counts the events read from the log during the run, whether or
/// not every subscription needed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedResult {
    Success { processed: u64 },
    Failed { processed: u64, errors: Vec<SubscriptionFailure> },
}

impl ProcessedResult {
    pub fn success(processed: u64) -> Self {
        ProcessedResult::Success { processed }
    }

    pub fn processed(&self) -> u64 {
        match self {
            ProcessedResult::Success { processed } | ProcessedResult::Failed { processed, .. } => *processed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessedResult::Success { .. })
    }

    pub fn errors(&self) -> &[SubscriptionFailure] {
        match self {
            ProcessedResult::Success { .. } => &[],
            ProcessedResult::Failed { errors, .. } => errors,
        }
    }

    pub(crate) fn from_parts(processed: u64, errors: Vec<SubscriptionFailure>) -> Self {
        if errors.is_empty() {
            ProcessedResult::Success { processed }
        } else {
            ProcessedResult::Failed { processed, errors }
        }
    }

    /// Combine results of consecutive runs.
    pub fn merge(self, other: ProcessedResult) -> Self {
        let processed = self.processed() + other.processed();
        let mut errors = self.errors().to_vec();
        errors.extend_from_slice(other.errors());
        Self::from_parts(processed, errors)
    }
}

/// Engine-level failure. Projection apply errors never end up here; they are
/// stored on the subscription and reported through [`ProcessedResult`].
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription store error: {0}")]
    Store(String),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error("subscription '{0}' has no registered projection")]
    UnknownSubscription(SubscriptionId),

    #[error("subscription '{0}' is already registered")]
    AlreadyRegistered(SubscriptionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_keeps_the_position_and_transition_clears_the_error() {
        let mut subscription = Subscription::new(SubscriptionId::new("contentGraph").unwrap());
        subscription.position = SequenceNumber::new(4);

        subscription.fail("boom");
        assert_eq!(subscription.status, SubscriptionStatus::Error);
        assert_eq!(subscription.error.as_deref(), Some("boom"));
        assert_eq!(subscription.position, SequenceNumber::new(4));

        subscription.transition(SubscriptionStatus::Active);
        assert_eq!(subscription.error, None);
    }

    #[test]
    fn status_names_round_trip() {
        for status in [
            SubscriptionStatus::New,
            SubscriptionStatus::Booting,
            SubscriptionStatus::Active,
            SubscriptionStatus::Error,
            SubscriptionStatus::Detached,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::parse("active"), None);
    }

    #[test]
    fn merged_results_add_up() {
        let failure = SubscriptionFailure {
            subscription_id: SubscriptionId::new("a").unwrap(),
            sequence_number: SequenceNumber::new(2),
            message: "boom".to_string(),
        };
        let merged = ProcessedResult::success(3)
            .merge(ProcessedResult::Failed {
                processed: 2,
                errors: vec![failure.clone()],
            });
        assert_eq!(merged.processed(), 5);
        assert_eq!(merged.errors(), &[failure]);
        assert!(ProcessedResult::success(1).merge(ProcessedResult::success(1)).is_success());
    }
}
