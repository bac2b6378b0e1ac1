//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; events are the source of truth.
//! This module provides deterministic replay and cursor tracking
//! without making storage assumptions.

use crate::projection::ProjectionError;
use crate::stream::SequenceNumber;
use crate::{EventEnvelope, Projection};

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: SequenceNumber,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: SequenceNumber::none(),
        }
    }

    /// Resume a runner whose projection already reflects events up to `cursor`.
    pub fn resume_at(projection: P, cursor: SequenceNumber) -> Self {
        Self { projection, cursor }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Last applied sequence number ([`SequenceNumber::none`] before the first event).
    pub fn cursor(&self) -> SequenceNumber {
        self.cursor
    }

    /// Apply a single envelope, enforcing monotonic sequencing.
    ///
    /// The cursor only moves when the projection accepted the event.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found = envelope.sequence_number();
        if found <= self.cursor {
            return Err(ProjectionError::NonMonotonicSequence {
                last: self.cursor,
                found,
            });
        }

        self.projection.apply(envelope)?;
        self.cursor = found;
        Ok(())
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    ///
    /// The factory is used to create a fresh projection instance.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, SequenceNumber), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;
    use escr_core::EventId;

    #[derive(Debug, Clone)]
    struct Added(i64);

    impl Event for Added {
        fn event_type(&self) -> &'static str {
            "Added"
        }
    }

    #[derive(Debug, Default)]
    struct Sum {
        total: i64,
    }

    impl Projection for Sum {
        type Ev = Added;

        fn reset(&mut self) -> Result<(), ProjectionError> {
            self.total = 0;
            Ok(())
        }

        fn apply(&mut self, envelope: &EventEnvelope<Added>) -> Result<(), ProjectionError> {
            if envelope.payload().0 < 0 {
                return Err(ProjectionError::apply("negative"));
            }
            self.total += envelope.payload().0;
            Ok(())
        }
    }

    fn envelope(seq: u64, value: i64) -> EventEnvelope<Added> {
        EventEnvelope::new(EventId::new(), "Added", Added(value))
            .at_sequence(SequenceNumber::new(seq))
    }

    #[test]
    fn applies_in_order_and_tracks_cursor() {
        let mut runner = ProjectionRunner::new(Sum::default());
        runner.run(&[envelope(1, 2), envelope(2, 3)]).unwrap();
        assert_eq!(runner.projection().total, 5);
        assert_eq!(runner.cursor(), SequenceNumber::new(2));
    }

    #[test]
    fn rejects_replayed_sequence_numbers() {
        let mut runner = ProjectionRunner::new(Sum::default());
        runner.apply(&envelope(1, 2)).unwrap();
        let err = runner.apply(&envelope(1, 2)).unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { .. }));
        assert_eq!(runner.projection().total, 2);
    }

    #[test]
    fn failed_apply_does_not_move_the_cursor() {
        let mut runner = ProjectionRunner::new(Sum::default());
        runner.apply(&envelope(1, 2)).unwrap();
        assert!(runner.apply(&envelope(2, -1)).is_err());
        assert_eq!(runner.cursor(), SequenceNumber::new(1));
        runner.apply(&envelope(3, 1)).unwrap();
        assert_eq!(runner.projection().total, 3);
    }

    #[test]
    fn rebuild_matches_incremental_application() {
        let events = vec![envelope(1, 4), envelope(2, 5), envelope(5, 1)];

        let mut incremental = ProjectionRunner::new(Sum::default());
        for e in &events {
            incremental.apply(e).unwrap();
        }

        let (rebuilt, cursor) = ProjectionRunner::rebuild_from_scratch(Sum::default, &events).unwrap();
        assert_eq!(rebuilt.total, incremental.projection().total);
        assert_eq!(cursor, incremental.cursor());
    }
}
