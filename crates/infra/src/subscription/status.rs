use serde::Serialize;

use escr_core::SubscriptionId;
use escr_events::{ProjectionStatus, SequenceNumber};

use super::{Subscription, SubscriptionStatus};

/// What ops tooling sees for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatusReport {
    pub subscription_id: SubscriptionId,
    /// `None` until `setup` stored a record.
    pub subscription_status: Option<SubscriptionStatus>,
    pub position: SequenceNumber,
    /// Whether a projection is registered under this id.
    pub registered: bool,
    pub health: ProjectionStatus,
}

impl SubscriptionStatusReport {
    /// Report for a stored record. `projection` is the registered projection's
    /// own status, `None` if nothing is registered under the id.
    pub(crate) fn for_subscription(subscription: &Subscription, projection: Option<ProjectionStatus>) -> Self {
        let registered = projection.is_some();
        // Unregistered records count as detached before a catch-up persists it.
        let status = if registered {
            subscription.status
        } else {
            SubscriptionStatus::Detached
        };
        let health = match (status, projection) {
            (SubscriptionStatus::New, _) => {
                ProjectionStatus::SetupRequired("subscription was added but its projection is not set up".to_string())
            }
            (SubscriptionStatus::Booting, _) => {
                ProjectionStatus::ReplayRequired("subscription is booting; run boot or replay".to_string())
            }
            (SubscriptionStatus::Error, _) => ProjectionStatus::Error(
                subscription
                    .error
                    .clone()
                    .unwrap_or_else(|| "subscription failed".to_string()),
            ),
            (SubscriptionStatus::Detached, None) => ProjectionStatus::ReplayRequired(format!(
                "no projection is registered for '{}'; the subscription is detached at {}",
                subscription.id, subscription.position
            )),
            (SubscriptionStatus::Detached, Some(_)) => ProjectionStatus::ReplayRequired(format!(
                "subscription is detached at {}; reactivate it to resume",
                subscription.position
            )),
            (SubscriptionStatus::Active, Some(projection)) => projection,
            (SubscriptionStatus::Active, None) => ProjectionStatus::Ok,
        };
        Self {
            subscription_id: subscription.id.clone(),
            subscription_status: Some(status),
            position: subscription.position,
            registered,
            health,
        }
    }

    /// Report for a registered projection without a stored record.
    pub(crate) fn not_set_up(subscription_id: SubscriptionId) -> Self {
        Self {
            subscription_id,
            subscription_status: None,
            position: SequenceNumber::none(),
            registered: true,
            health: ProjectionStatus::SetupRequired("subscription has not been set up".to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.health.is_ok()
    }

    pub fn details(&self) -> &str {
        self.health.details()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(status: SubscriptionStatus) -> Subscription {
        let mut subscription = Subscription::new(SubscriptionId::new("documentUriPaths").unwrap());
        subscription.transition(status);
        subscription.position = SequenceNumber::new(5);
        subscription
    }

    #[test]
    fn unregistered_records_report_as_detached() {
        let report = SubscriptionStatusReport::for_subscription(&subscription(SubscriptionStatus::Active), None);
        assert_eq!(report.subscription_status, Some(SubscriptionStatus::Detached));
        assert_eq!(report.position, SequenceNumber::new(5));
        assert!(!report.is_ok());
        assert!(report.details().contains("detached"));
    }

    #[test]
    fn active_records_take_the_projection_status() {
        let ok = SubscriptionStatusReport::for_subscription(
            &subscription(SubscriptionStatus::Active),
            Some(ProjectionStatus::Ok),
        );
        assert!(ok.is_ok());

        let mut failed = subscription(SubscriptionStatus::Active);
        failed.fail("parent missing");
        let report = SubscriptionStatusReport::for_subscription(&failed, Some(ProjectionStatus::Ok));
        assert_eq!(report.health, ProjectionStatus::Error("parent missing".to_string()));
    }
}
