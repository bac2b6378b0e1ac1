//! Drives registered projections through the event log.
//!
//! ```text
//! EventStore ──load(from = min position + 1)──> denormalize
//!                                                   │ for each event, in sequence order
//!                                                   ▼
//!            ┌──────────── subscriptions behind this event ────────────┐
//!            │ projection.apply(envelope)                              │
//!            │   Ok  -> position = event.sequence_number (persisted)   │
//!            │   Err -> status = ERROR (persisted), skipped from now   │
//!            └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Detachment
//!
//! Every state-changing entry point first marks stored subscriptions whose
//! projection is no longer registered as `DETACHED`, keeping their position.
//! [`SubscriptionEngine::subscription_statuses`] reports such records as
//! detached even before that happened.
//!
//! ## Concurrency
//!
//! One engine per repository at a time; nothing here guards against a second
//! process catching up the same subscriptions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use escr_core::SubscriptionId;
use escr_events::{Event, Projection, SequenceNumber};

use super::status::SubscriptionStatusReport;
use super::store::SubscriptionStore;
use super::{
    ProcessedResult, Subscription, SubscriptionCriteria, SubscriptionError, SubscriptionFailure,
    SubscriptionStatus,
};
use crate::event_store::{EventNormalizer, EventStore, EventStreamFilter, EventStreamSelector, StoredEvent};

/// A registered projection.
pub type Subscriber<E> = Box<dyn Projection<Ev = E> + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Stop after this event instead of the head of the log.
    pub max_sequence_number: Option<SequenceNumber>,
}

impl ReplayOptions {
    pub fn until(max: SequenceNumber) -> Self {
        Self {
            max_sequence_number: Some(max),
        }
    }
}

/// Reported after every event of a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayProgress {
    pub subscription_id: SubscriptionId,
    pub sequence_number: SequenceNumber,
    pub processed: u64,
}

pub struct SubscriptionEngine<E: Event> {
    event_store: Arc<dyn EventStore>,
    store: Arc<dyn SubscriptionStore>,
    subscribers: BTreeMap<SubscriptionId, Subscriber<E>>,
    normalizer: EventNormalizer,
}

impl<E> SubscriptionEngine<E>
where
    E: Event + DeserializeOwned,
{
    pub fn new(event_store: Arc<dyn EventStore>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            event_store,
            store,
            subscribers: BTreeMap::new(),
            normalizer: EventNormalizer::new(),
        }
    }

    pub fn register(&mut self, id: SubscriptionId, projection: Subscriber<E>) -> Result<(), SubscriptionError> {
        if self.subscribers.contains_key(&id) {
            return Err(SubscriptionError::AlreadyRegistered(id));
        }
        self.subscribers.insert(id, projection);
        Ok(())
    }

    pub fn is_registered(&self, id: &SubscriptionId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn registered_ids(&self) -> impl Iterator<Item = &SubscriptionId> {
        self.subscribers.keys()
    }

    /// Add records for new projections and set their storage up.
    ///
    /// Existing records keep their status and position; a failing projection
    /// setup puts the subscription into `ERROR`.
    pub fn setup(&mut self) -> Result<(), SubscriptionError> {
        self.store.setup()?;
        self.detach_orphans()?;

        let mut stored: BTreeMap<SubscriptionId, Subscription> = self
            .store
            .find(&SubscriptionCriteria::all())?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        for (id, projection) in self.subscribers.iter_mut() {
            let mut subscription = match stored.remove(id) {
                Some(existing) => existing,
                None => {
                    let created = Subscription::new(id.clone());
                    self.store.add(&created)?;
                    info!(subscription = %id, "subscription added");
                    created
                }
            };
            match projection.setup() {
                Ok(()) if subscription.status == SubscriptionStatus::New => {
                    subscription.transition(SubscriptionStatus::Booting);
                    self.store.update(&subscription)?;
                }
                Ok(()) => {}
                Err(e) => {
                    warn!(subscription = %id, error = %e, "projection setup failed");
                    subscription.fail(e.to_string());
                    self.store.update(&subscription)?;
                }
            }
        }
        Ok(())
    }

    /// Catch up booting subscriptions and activate them.
    pub fn boot(&mut self) -> Result<ProcessedResult, SubscriptionError> {
        self.detach_orphans()?;
        let booting = self.registered(&SubscriptionCriteria::with_statuses([SubscriptionStatus::Booting]))?;
        if booting.is_empty() {
            return Ok(ProcessedResult::success(0));
        }
        info!(count = booting.len(), "booting subscriptions");
        let (result, caught_up) = self.catch_up(booting, None, &mut |_| {})?;
        for mut subscription in caught_up {
            subscription.transition(SubscriptionStatus::Active);
            self.store.update(&subscription)?;
        }
        Ok(result)
    }

    /// Apply every event active subscriptions have not seen yet.
    pub fn catch_up_active(&mut self) -> Result<ProcessedResult, SubscriptionError> {
        self.detach_orphans()?;
        let active = self.registered(&SubscriptionCriteria::with_statuses([SubscriptionStatus::Active]))?;
        let (result, _) = self.catch_up(active, None, &mut |_| {})?;
        Ok(result)
    }

    /// Resume detached or failed subscriptions from their stored position.
    ///
    /// Subscriptions without a registered projection stay detached.
    pub fn reactivate(&mut self, criteria: &SubscriptionCriteria) -> Result<ProcessedResult, SubscriptionError> {
        self.detach_orphans()?;
        let mut resumable = Vec::new();
        for mut subscription in self.store.find(criteria)? {
            if !matches!(
                subscription.status,
                SubscriptionStatus::Detached | SubscriptionStatus::Error
            ) {
                continue;
            }
            if !self.subscribers.contains_key(&subscription.id) {
                warn!(subscription = %subscription.id, "cannot reactivate, no projection registered");
                continue;
            }
            subscription.transition(SubscriptionStatus::Active);
            self.store.update(&subscription)?;
            info!(
                subscription = %subscription.id,
                position = %subscription.position,
                "subscription reactivated"
            );
            resumable.push(subscription);
        }
        let (result, _) = self.catch_up(resumable, None, &mut |_| {})?;
        Ok(result)
    }

    /// Drop projection state and rewind matching registered subscriptions to
    /// zero. They stay `BOOTING` until the next boot or replay.
    pub fn reset(&mut self, criteria: &SubscriptionCriteria) -> Result<Vec<SubscriptionFailure>, SubscriptionError> {
        self.detach_orphans()?;
        let mut failures = Vec::new();
        for subscription in self.registered(criteria)? {
            if let Some(failure) = self.reset_one(subscription)? {
                failures.push(failure);
            }
        }
        Ok(failures)
    }

    /// Rebuild one projection from the first event.
    pub fn replay(
        &mut self,
        id: &SubscriptionId,
        options: &ReplayOptions,
        mut progress: impl FnMut(&ReplayProgress),
    ) -> Result<ProcessedResult, SubscriptionError> {
        self.detach_orphans()?;
        if !self.subscribers.contains_key(id) {
            return Err(SubscriptionError::UnknownSubscription(id.clone()));
        }
        let subscription = match self.store.find(&SubscriptionCriteria::with_ids([id.clone()]))?.pop() {
            Some(existing) => existing,
            None => {
                let created = Subscription::new(id.clone());
                self.store.add(&created)?;
                created
            }
        };

        info!(subscription = %id, max = ?options.max_sequence_number, "replay started");
        let subscription = match self.reset_one(subscription)? {
            Some(failure) => {
                return Ok(ProcessedResult::Failed {
                    processed: 0,
                    errors: vec![failure],
                });
            }
            None => self.store.find(&SubscriptionCriteria::with_ids([id.clone()]))?,
        };

        let (result, caught_up) = self.catch_up(subscription, options.max_sequence_number, &mut progress)?;
        for mut subscription in caught_up {
            subscription.transition(SubscriptionStatus::Active);
            self.store.update(&subscription)?;
        }
        info!(subscription = %id, processed = result.processed(), "replay finished");
        Ok(result)
    }

    /// Replay every registered projection, one after the other.
    pub fn replay_all(
        &mut self,
        options: &ReplayOptions,
        mut on_subscription: impl FnMut(&SubscriptionId),
        mut progress: impl FnMut(&ReplayProgress),
    ) -> Result<ProcessedResult, SubscriptionError> {
        let ids: Vec<SubscriptionId> = self.subscribers.keys().cloned().collect();
        let mut result = ProcessedResult::success(0);
        for id in ids {
            on_subscription(&id);
            result = result.merge(self.replay(&id, options, &mut progress)?);
        }
        Ok(result)
    }

    /// One report per stored record plus one per registered projection that
    /// was never set up.
    pub fn subscription_statuses(&self) -> Result<Vec<SubscriptionStatusReport>, SubscriptionError> {
        let stored = self.store.find(&SubscriptionCriteria::all())?;
        let mut reports: Vec<SubscriptionStatusReport> = stored
            .iter()
            .map(|subscription| {
                let projection = self.subscribers.get(&subscription.id).map(|p| p.status());
                SubscriptionStatusReport::for_subscription(subscription, projection)
            })
            .collect();
        for id in self.subscribers.keys() {
            if !stored.iter().any(|s| &s.id == id) {
                reports.push(SubscriptionStatusReport::not_set_up(id.clone()));
            }
        }
        reports.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
        Ok(reports)
    }

    /// Persist `DETACHED` for records whose projection is gone.
    fn detach_orphans(&self) -> Result<usize, SubscriptionError> {
        let mut detached = 0;
        for mut subscription in self.store.find(&SubscriptionCriteria::all())? {
            if self.subscribers.contains_key(&subscription.id)
                || subscription.status == SubscriptionStatus::Detached
            {
                continue;
            }
            warn!(
                subscription = %subscription.id,
                position = %subscription.position,
                "projection is no longer registered, detaching subscription"
            );
            subscription.transition(SubscriptionStatus::Detached);
            self.store.update(&subscription)?;
            detached += 1;
        }
        Ok(detached)
    }

    fn registered(&self, criteria: &SubscriptionCriteria) -> Result<Vec<Subscription>, SubscriptionError> {
        Ok(self
            .store
            .find(criteria)?
            .into_iter()
            .filter(|s| self.subscribers.contains_key(&s.id))
            .collect())
    }

    fn reset_one(&mut self, mut subscription: Subscription) -> Result<Option<SubscriptionFailure>, SubscriptionError> {
        let Some(projection) = self.subscribers.get_mut(&subscription.id) else {
            return Err(SubscriptionError::UnknownSubscription(subscription.id));
        };
        subscription.position = SequenceNumber::none();
        if let Err(e) = projection.reset() {
            warn!(subscription = %subscription.id, error = %e, "projection reset failed");
            subscription.fail(e.to_string());
            self.store.update(&subscription)?;
            return Ok(Some(SubscriptionFailure {
                subscription_id: subscription.id,
                sequence_number: SequenceNumber::none(),
                message: e.to_string(),
            }));
        }
        subscription.transition(SubscriptionStatus::Booting);
        self.store.update(&subscription)?;
        Ok(None)
    }

    /// Feed `subscriptions` every event after their position, up to `max`.
    ///
    /// Returns the run's result and the subscriptions that did not fail, with
    /// their final positions. An event that cannot be decoded fails the
    /// subscriptions that have not passed it yet.
    fn catch_up(
        &mut self,
        subscriptions: Vec<Subscription>,
        max: Option<SequenceNumber>,
        progress: &mut dyn FnMut(&ReplayProgress),
    ) -> Result<(ProcessedResult, Vec<Subscription>), SubscriptionError> {
        let Some(lowest) = subscriptions.iter().map(|s| s.position).min() else {
            return Ok((ProcessedResult::success(0), Vec::new()));
        };
        let filter = EventStreamFilter::new()
            .from_sequence_number(lowest.next())
            .until_sequence_number(max);
        let events = self.event_store.load(&EventStreamSelector::All, &filter)?;
        debug!(
            subscriptions = subscriptions.len(),
            from = %lowest.next(),
            events = events.len(),
            "catching up"
        );

        let mut pending: BTreeMap<SubscriptionId, Subscription> =
            subscriptions.into_iter().map(|s| (s.id.clone(), s)).collect();
        let mut errors = Vec::new();
        let mut processed = 0;

        for stored in &events {
            let envelope = match self.normalizer.denormalize::<E>(stored) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let failures = self.fail_behind(&mut pending, stored, &e.to_string())?;
                    errors.extend(failures);
                    processed += 1;
                    continue;
                }
            };
            let sequence_number = envelope.sequence_number();
            let mut failed = Vec::new();

            for subscription in pending.values_mut() {
                if subscription.position >= sequence_number {
                    continue;
                }
                let Some(projection) = self.subscribers.get_mut(&subscription.id) else {
                    continue;
                };
                match projection.apply(&envelope) {
                    Ok(()) => {
                        subscription.position = sequence_number;
                        self.store.update(subscription)?;
                        progress(&ReplayProgress {
                            subscription_id: subscription.id.clone(),
                            sequence_number,
                            processed: processed + 1,
                        });
                    }
                    Err(e) => {
                        warn!(
                            subscription = %subscription.id,
                            sequence_number = %sequence_number,
                            event_type = stored.event_type.as_str(),
                            error = %e,
                            "projection failed to apply event"
                        );
                        subscription.fail(e.to_string());
                        self.store.update(subscription)?;
                        errors.push(SubscriptionFailure {
                            subscription_id: subscription.id.clone(),
                            sequence_number,
                            message: e.to_string(),
                        });
                        failed.push(subscription.id.clone());
                    }
                }
            }
            for id in failed {
                pending.remove(&id);
            }
            processed += 1;
        }

        Ok((
            ProcessedResult::from_parts(processed, errors),
            pending.into_values().collect(),
        ))
    }

    /// Puts every pending subscription that still needs `stored` into ERROR.
    fn fail_behind(
        &mut self,
        pending: &mut BTreeMap<SubscriptionId, Subscription>,
        stored: &StoredEvent,
        message: &str,
    ) -> Result<Vec<SubscriptionFailure>, SubscriptionError> {
        let behind: Vec<SubscriptionId> = pending
            .values()
            .filter(|s| s.position < stored.sequence_number)
            .map(|s| s.id.clone())
            .collect();
        let mut failures = Vec::with_capacity(behind.len());
        for id in behind {
            let Some(mut subscription) = pending.remove(&id) else {
                continue;
            };
            warn!(
                subscription = %subscription.id,
                sequence_number = %stored.sequence_number,
                event_type = stored.event_type.as_str(),
                error = message,
                "event could not be decoded"
            );
            subscription.fail(message.to_string());
            self.store.update(&subscription)?;
            failures.push(SubscriptionFailure {
                subscription_id: subscription.id,
                sequence_number: stored.sequence_number,
                message: message.to_string(),
            });
        }
        Ok(failures)
    }
}
