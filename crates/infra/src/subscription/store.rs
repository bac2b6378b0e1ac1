use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use escr_core::SubscriptionId;

use super::{Subscription, SubscriptionCriteria, SubscriptionError};

/// Durable subscription records.
///
/// A single catch-up process per repository is assumed, so there is no
/// locking beyond what each call does internally.
pub trait SubscriptionStore: Send + Sync {
    /// Provision storage. Idempotent.
    fn setup(&self) -> Result<(), SubscriptionError>;

    /// Matching records, ordered by id.
    fn find(&self, criteria: &SubscriptionCriteria) -> Result<Vec<Subscription>, SubscriptionError>;

    fn add(&self, subscription: &Subscription) -> Result<(), SubscriptionError>;

    fn update(&self, subscription: &Subscription) -> Result<(), SubscriptionError>;
}

impl<S> SubscriptionStore for Arc<S>
where
    S: SubscriptionStore + ?Sized,
{
    fn setup(&self) -> Result<(), SubscriptionError> {
        (**self).setup()
    }

    fn find(&self, criteria: &SubscriptionCriteria) -> Result<Vec<Subscription>, SubscriptionError> {
        (**self).find(criteria)
    }

    fn add(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        (**self).add(subscription)
    }

    fn update(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        (**self).update(subscription)
    }
}

/// In-memory subscription store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    inner: RwLock<BTreeMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> SubscriptionError {
        SubscriptionError::Store("subscription lock poisoned".to_string())
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    fn setup(&self) -> Result<(), SubscriptionError> {
        Ok(())
    }

    fn find(&self, criteria: &SubscriptionCriteria) -> Result<Vec<Subscription>, SubscriptionError> {
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(map.values().filter(|s| criteria.matches(s)).cloned().collect())
    }

    fn add(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        if map.contains_key(&subscription.id) {
            return Err(SubscriptionError::Store(format!(
                "subscription '{}' already exists",
                subscription.id
            )));
        }
        map.insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    fn update(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        match map.get_mut(&subscription.id) {
            Some(existing) => {
                *existing = subscription.clone();
                Ok(())
            }
            None => Err(SubscriptionError::Store(format!(
                "subscription '{}' does not exist",
                subscription.id
            ))),
        }
    }
}
